//! Common test utilities for integration tests.
//!
//! Scripted collaborators for driving the upload scheduler under paused time.

// Not every integration test uses every helper.
#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::Instant;

use domain::error::{AnalysisError, CollectionError};
use domain::models::{AnalysisResult, DeviceId, MonitoringPayload};
use domain::services::{AnalysisClient, DeviceDataCollector};
use guardian_agent::jobs::{BackoffPolicy, SchedulerSettings};

pub const INTERVAL: Duration = Duration::from_millis(900_000);
pub const MAX_BACKOFF: Duration = Duration::from_millis(3_600_000);

/// Default scheduler settings without jitter.
pub fn settings() -> SchedulerSettings {
    SchedulerSettings {
        high_risk_threshold: 7,
        backoff: BackoffPolicy::new(INTERVAL, 2.0, MAX_BACKOFF, 0.0),
    }
}

/// Let spawned tasks run without moving far in (paused) time.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// One scripted analysis response.
#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Risk(i32),
    Transport,
    Status(u16),
}

impl Reply {
    fn into_result(self) -> Result<AnalysisResult, AnalysisError> {
        match self {
            Reply::Risk(risk_level) => Ok(AnalysisResult {
                risk_level,
                concerns: vec![format!("risk {risk_level}")],
                recommendations: vec![],
            }),
            Reply::Transport => Err(AnalysisError::Transport("connection refused".to_string())),
            Reply::Status(status) => Err(AnalysisError::Server {
                status,
                message: "scripted".to_string(),
            }),
        }
    }
}

struct ClientState {
    replies: Mutex<VecDeque<Reply>>,
    default_reply: Reply,
    failing_devices: Mutex<HashSet<DeviceId>>,
    calls: Mutex<Vec<(DeviceId, Instant)>>,
    gate: Option<Semaphore>,
}

/// Analysis client answering from a script.
///
/// With a gate, every call waits for one permit before answering, which
/// keeps the exchange in flight until the test releases it.
#[derive(Clone)]
pub struct ScriptedAnalysisClient {
    state: Arc<ClientState>,
}

impl ScriptedAnalysisClient {
    pub fn new(default_reply: Reply) -> Self {
        Self::build(default_reply, None)
    }

    pub fn gated(default_reply: Reply) -> Self {
        Self::build(default_reply, Some(Semaphore::new(0)))
    }

    fn build(default_reply: Reply, gate: Option<Semaphore>) -> Self {
        Self {
            state: Arc::new(ClientState {
                replies: Mutex::new(VecDeque::new()),
                default_reply,
                failing_devices: Mutex::new(HashSet::new()),
                calls: Mutex::new(Vec::new()),
                gate,
            }),
        }
    }

    /// Queue replies used before falling back to the default.
    pub fn with_replies(self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.state.replies.lock().unwrap().extend(replies);
        self
    }

    /// Answer every call for this device with a transport error.
    pub fn fail_device(&self, device_id: &str) {
        self.state
            .failing_devices
            .lock()
            .unwrap()
            .insert(DeviceId::new(device_id));
    }

    /// Let `n` gated calls through.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.state.gate {
            gate.add_permits(n);
        }
    }

    pub fn call_count(&self) -> usize {
        self.state.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, device_id: &str) -> usize {
        self.state
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id.as_str() == device_id)
            .count()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.state.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    /// Gaps between consecutive calls.
    pub fn call_gaps(&self) -> Vec<Duration> {
        let times = self.call_times();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[async_trait::async_trait]
impl AnalysisClient for ScriptedAnalysisClient {
    async fn analyze(&self, payload: MonitoringPayload) -> Result<AnalysisResult, AnalysisError> {
        self.state
            .calls
            .lock()
            .unwrap()
            .push((payload.device_id.clone(), Instant::now()));

        if let Some(gate) = &self.state.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        if self
            .state
            .failing_devices
            .lock()
            .unwrap()
            .contains(&payload.device_id)
        {
            return Reply::Transport.into_result();
        }

        let reply = self
            .state
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.state.default_reply);
        reply.into_result()
    }
}

#[derive(Default)]
struct CollectorState {
    revoked: Mutex<bool>,
    calls: Mutex<Vec<Instant>>,
}

/// Collector returning empty payloads, or a revoked permission on demand.
#[derive(Clone, Default)]
pub struct ScriptedCollector {
    state: Arc<CollectorState>,
}

impl ScriptedCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revoke(&self) {
        *self.state.revoked.lock().unwrap() = true;
    }

    pub fn call_count(&self) -> usize {
        self.state.calls.lock().unwrap().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.state.calls.lock().unwrap().clone()
    }
}

impl DeviceDataCollector for ScriptedCollector {
    fn collect(&self, device_id: &DeviceId) -> Result<MonitoringPayload, CollectionError> {
        self.state.calls.lock().unwrap().push(Instant::now());

        if *self.state.revoked.lock().unwrap() {
            return Err(CollectionError::PermissionRevoked(
                "READ_SMS permission revoked".to_string(),
            ));
        }

        let mut payload = MonitoringPayload::empty(device_id.clone());
        payload.messages.push("see you at the park".to_string());
        payload.app_usage.insert("com.example.chat".to_string(), 42);
        Ok(payload)
    }
}
