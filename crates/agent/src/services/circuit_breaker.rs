//! Circuit breaker around the analysis endpoint.
//!
//! After `failure_threshold` consecutive endpoint failures the circuit opens
//! and requests fail fast with [`AnalysisError::CircuitOpen`]. Once
//! `reset_timeout` has elapsed a single probe request is let through; its
//! result closes or re-opens the circuit.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use domain::error::AnalysisError;
use domain::models::{AnalysisResult, MonitoringPayload};
use domain::services::AnalysisClient;

use crate::middleware::metrics;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    fn metric_value(&self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        }
    }
}

#[derive(Debug, Default)]
struct BreakerInner {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Circuit breaker for external service protection.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

/// Permission to send one request. Report the result through
/// [`Permit::success`] or [`Permit::failure`]; dropping it unreported
/// releases a half-open probe slot without changing the state.
#[must_use]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    resolved: bool,
}

impl Permit<'_> {
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn success(mut self) {
        self.resolved = true;
        self.breaker.record_success();
    }

    pub fn failure(mut self) {
        self.resolved = true;
        self.breaker.record_failure();
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.probe && !self.resolved {
            self.breaker.lock().probe_in_flight = false;
        }
    }
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            inner: Mutex::new(BreakerInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask to send a request. `None` means the circuit is open.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut inner = self.lock();

        let Some(opened_at) = inner.opened_at else {
            return Some(Permit {
                breaker: self,
                probe: false,
                resolved: false,
            });
        };

        if opened_at.elapsed() < self.reset_timeout || inner.probe_in_flight {
            return None;
        }

        debug!("Circuit breaker transitioning to half-open");
        inner.probe_in_flight = true;
        metrics::record_circuit_state(CircuitState::HalfOpen.metric_value());
        Some(Permit {
            breaker: self,
            probe: true,
            resolved: false,
        })
    }

    /// Record a successful request.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        inner.probe_in_flight = false;
        if inner.opened_at.take().is_some() {
            info!("Circuit breaker closed after successful request");
            metrics::record_circuit_state(CircuitState::Closed.metric_value());
        }
    }

    /// Record a failed request.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        if inner.opened_at.is_some() {
            // A failed probe keeps the circuit open for another full period
            if inner.probe_in_flight {
                inner.probe_in_flight = false;
                inner.opened_at = Some(Instant::now());
                warn!("Circuit breaker probe failed, staying open");
                metrics::record_circuit_state(CircuitState::Open.metric_value());
            }
            return;
        }

        if inner.consecutive_failures >= self.failure_threshold {
            warn!(
                failure_count = inner.consecutive_failures,
                threshold = self.failure_threshold,
                "Circuit breaker opened due to consecutive failures"
            );
            inner.opened_at = Some(Instant::now());
            metrics::record_circuit_state(CircuitState::Open.metric_value());
        }
    }

    /// Get current state.
    pub fn state(&self) -> CircuitState {
        let inner = self.lock();
        match inner.opened_at {
            None => CircuitState::Closed,
            Some(opened_at) if opened_at.elapsed() >= self.reset_timeout => CircuitState::HalfOpen,
            Some(_) => CircuitState::Open,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }
}

/// Wraps an [`AnalysisClient`] with a shared [`CircuitBreaker`].
///
/// Only endpoint failures (transport errors, timeouts, retryable statuses)
/// count against the circuit. Rejections such as a 400 prove the endpoint is
/// up and count as successes.
pub struct GuardedAnalysisClient<C> {
    inner: C,
    breaker: Arc<CircuitBreaker>,
}

impl<C> GuardedAnalysisClient<C> {
    pub fn new(inner: C, breaker: Arc<CircuitBreaker>) -> Self {
        Self { inner, breaker }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }
}

#[async_trait]
impl<C: AnalysisClient> AnalysisClient for GuardedAnalysisClient<C> {
    async fn analyze(&self, payload: MonitoringPayload) -> Result<AnalysisResult, AnalysisError> {
        let Some(permit) = self.breaker.try_acquire() else {
            debug!(device_id = %payload.device_id, "Analysis circuit open, request not sent");
            return Err(AnalysisError::CircuitOpen);
        };

        let result = self.inner.analyze(payload).await;
        match &result {
            Err(e) if e.is_endpoint_failure() => permit.failure(),
            _ => permit.success(),
        }
        result
    }
}
