//! Periodic monitoring upload scheduler.
//!
//! Each started device gets its own timeline task that runs
//! collect -> analyze -> alert -> reschedule, strictly one cycle at a time.
//! Timelines of different devices run independently.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use domain::error::{CycleError, FailureKind};
use domain::models::{
    AnalysisResult, DeviceId, RiskAlert, UploadFailure, UploadState, UploadStatus,
};
use domain::services::{AlertSink, AnalysisClient, DeviceDataCollector};

use super::backoff::BackoffPolicy;
use crate::config::UploadConfig;
use crate::middleware::metrics;

/// Scheduler tuning derived from [`UploadConfig`].
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub high_risk_threshold: i32,
    pub backoff: BackoffPolicy,
}

impl SchedulerSettings {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            high_risk_threshold: config.high_risk_threshold,
            backoff: BackoffPolicy::from_config(config),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from_config(&UploadConfig::default())
    }
}

/// What happened to the alert of a completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertDisposition {
    /// Risk level below the threshold.
    NotRequired,
    Delivered(Uuid),
    /// The sink failed; the error is logged and recorded in the status.
    Failed { alert_id: Uuid, error: String },
}

/// Result of an analysis exchange that reached the endpoint successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub risk_level: i32,
    pub alert: AlertDisposition,
}

/// Outcome of one upload cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    Completed(CycleReport),
    Failed(CycleError),
    /// Another cycle for the same device was still in flight.
    Skipped,
    /// The timeline was stopped before the result arrived; nothing was done with it.
    Discarded,
}

impl CycleOutcome {
    fn metric_label(&self) -> &'static str {
        match self {
            CycleOutcome::Completed(_) => "success",
            CycleOutcome::Failed(error) => error.kind().as_str(),
            CycleOutcome::Skipped => "skipped",
            CycleOutcome::Discarded => "discarded",
        }
    }
}

/// Drives periodic monitoring uploads for one or more devices.
///
/// Cheap to clone; clones share the same timelines.
#[derive(Clone)]
pub struct UploadScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    collector: Arc<dyn DeviceDataCollector>,
    client: Arc<dyn AnalysisClient>,
    alert_sink: Arc<dyn AlertSink>,
    settings: SchedulerSettings,
    state: Mutex<SchedulerState>,
    /// Woken whenever a device's in-flight slot is released.
    released: Notify,
}

#[derive(Default)]
struct SchedulerState {
    timelines: HashMap<DeviceId, Timeline>,
    in_flight: HashSet<DeviceId>,
    statuses: HashMap<DeviceId, UploadStatus>,
    /// Stopped timelines that may still be finishing an in-flight exchange.
    retired: Vec<JoinHandle<()>>,
}

impl SchedulerState {
    fn status_mut(&mut self, device_id: &DeviceId) -> &mut UploadStatus {
        self.statuses
            .entry(device_id.clone())
            .or_insert_with(|| UploadStatus::new(device_id.clone()))
    }

    /// Signal a timeline to stop and keep its handle for shutdown.
    fn retire(&mut self, device_id: &DeviceId) -> bool {
        let Some(timeline) = self.timelines.remove(device_id) else {
            return false;
        };

        timeline.shutdown_tx.send_replace(true);
        self.retired.retain(|handle| !handle.is_finished());
        self.retired.push(timeline.handle);

        let status = self.status_mut(device_id);
        if status.state != UploadState::InFlight {
            status.state = UploadState::Stopped;
        }
        status.next_cycle_at = None;
        true
    }
}

struct Timeline {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

enum CycleStart {
    Started(InFlightGuard),
    AlreadyInFlight,
    Stopped,
}

/// Marks a device as having a cycle in flight until dropped.
struct InFlightGuard {
    inner: Arc<SchedulerInner>,
    device_id: DeviceId,
    resume_state: UploadState,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.lock_state().in_flight.remove(&self.device_id);
        self.inner.released.notify_waiters();
    }
}

impl UploadScheduler {
    pub fn new(
        collector: Arc<dyn DeviceDataCollector>,
        client: Arc<dyn AnalysisClient>,
        alert_sink: Arc<dyn AlertSink>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                collector,
                client,
                alert_sink,
                settings,
                state: Mutex::new(SchedulerState::default()),
                released: Notify::new(),
            }),
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.inner.settings
    }

    /// Start the upload timeline for a device. The first cycle runs immediately.
    ///
    /// Does nothing but log if the device's timeline is already running.
    /// Must be called from within a tokio runtime.
    pub fn start(&self, device_id: DeviceId) {
        let mut state = self.inner.lock_state();

        if let Some(timeline) = state.timelines.get(&device_id) {
            if !timeline.handle.is_finished() {
                info!(device_id = %device_id, "Upload timeline already running");
                return;
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        let span = info_span!("upload_timeline", device_id = %device_id);
        let handle = tokio::spawn(
            inner
                .run_timeline(device_id.clone(), shutdown_rx)
                .instrument(span),
        );

        let status = state.status_mut(&device_id);
        if status.state != UploadState::InFlight {
            status.state = UploadState::Scheduled;
        }
        state.timelines.insert(
            device_id.clone(),
            Timeline {
                shutdown_tx,
                handle,
            },
        );

        info!(
            device_id = %device_id,
            interval_ms = self.inner.settings.backoff.interval().as_millis() as u64,
            high_risk_threshold = self.inner.settings.high_risk_threshold,
            "Upload timeline started"
        );
    }

    /// Stop the upload timeline for a device.
    ///
    /// No cycle starts after this returns. A network exchange already in
    /// flight may finish, but its result is discarded. Returns false if the
    /// device had no running timeline.
    pub fn stop(&self, device_id: &DeviceId) -> bool {
        let stopped = self.inner.lock_state().retire(device_id);
        if stopped {
            info!(device_id = %device_id, "Upload timeline stopped");
        } else {
            debug!(device_id = %device_id, "Stop requested for device without a running timeline");
        }
        stopped
    }

    /// Run a single cycle now, outside of the device's timeline.
    ///
    /// Respects the in-flight guard and does not reschedule anything.
    pub async fn run_once(&self, device_id: &DeviceId) -> CycleOutcome {
        self.inner.execute_cycle(device_id, None).await
    }

    pub fn is_running(&self, device_id: &DeviceId) -> bool {
        self.inner
            .lock_state()
            .timelines
            .get(device_id)
            .is_some_and(|timeline| !timeline.handle.is_finished())
    }

    /// Number of timelines currently running.
    pub fn active_timelines(&self) -> usize {
        self.inner
            .lock_state()
            .timelines
            .values()
            .filter(|timeline| !timeline.handle.is_finished())
            .count()
    }

    pub fn status(&self, device_id: &DeviceId) -> Option<UploadStatus> {
        self.inner.lock_state().statuses.get(device_id).cloned()
    }

    /// Status of every device the scheduler has seen, ordered by device id.
    pub fn statuses(&self) -> Vec<UploadStatus> {
        let mut statuses: Vec<UploadStatus> =
            self.inner.lock_state().statuses.values().cloned().collect();
        statuses.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        statuses
    }

    /// Stop every timeline and wait for their tasks to finish.
    pub async fn shutdown(&self, timeout: Duration) {
        let handles: Vec<JoinHandle<()>> = {
            let mut state = self.inner.lock_state();
            let device_ids: Vec<DeviceId> = state.timelines.keys().cloned().collect();
            for device_id in &device_ids {
                state.retire(device_id);
            }
            state.retired.drain(..).collect()
        };

        info!(
            timelines = handles.len(),
            "Waiting for upload timelines to finish (timeout: {:?})", timeout
        );

        let wait_all = async {
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!("Upload timeline task panicked: {}", e);
                }
            }
        };

        match tokio::time::timeout(timeout, wait_all).await {
            Ok(()) => info!("All upload timelines finished"),
            Err(_) => warn!("Upload timeline shutdown timed out after {:?}", timeout),
        }
    }
}

impl SchedulerInner {
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_timeline(
        self: Arc<Self>,
        device_id: DeviceId,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut first_cycle = true;
        loop {
            let outcome = self.execute_cycle(&device_id, Some(&shutdown_rx)).await;

            // A restarted timeline may find the stopped one's exchange still
            // pending. Its first cycle runs as soon as that slot frees up.
            if first_cycle && matches!(outcome, CycleOutcome::Skipped) {
                if !self.wait_for_release(&device_id, &mut shutdown_rx).await {
                    break;
                }
                continue;
            }
            first_cycle = false;

            let Some(delay) = self.schedule_next(&device_id, &outcome, &shutdown_rx) else {
                break;
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.changed() => break,
            }
        }

        debug!(device_id = %device_id, "Upload timeline exited");
    }

    /// Wait until no cycle is in flight for the device.
    ///
    /// Returns false if the timeline was stopped meanwhile.
    async fn wait_for_release(
        &self,
        device_id: &DeviceId,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> bool {
        loop {
            // Registered before the check so a release in between is not missed
            let released = self.released.notified();
            let pending = self.lock_state().in_flight.contains(device_id);
            if !pending {
                return !*shutdown_rx.borrow();
            }

            debug!(device_id = %device_id, "Waiting for pending upload cycle to finish");
            tokio::select! {
                _ = released => {}
                _ = shutdown_rx.changed() => return false,
            }
        }
    }

    /// Claim the in-flight slot for a device.
    ///
    /// The shutdown flag is read under the state lock, which `stop` also
    /// holds while setting it.
    fn begin_cycle(
        self: &Arc<Self>,
        device_id: &DeviceId,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> CycleStart {
        let mut state = self.lock_state();

        if is_stopped(shutdown) {
            return CycleStart::Stopped;
        }

        if !state.in_flight.insert(device_id.clone()) {
            return CycleStart::AlreadyInFlight;
        }

        let status = state.status_mut(device_id);
        let resume_state = status.state;
        status.state = UploadState::InFlight;
        status.last_attempt_at = Some(Utc::now());

        CycleStart::Started(InFlightGuard {
            inner: Arc::clone(self),
            device_id: device_id.clone(),
            resume_state,
        })
    }

    async fn execute_cycle(
        self: &Arc<Self>,
        device_id: &DeviceId,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> CycleOutcome {
        let guard = match self.begin_cycle(device_id, shutdown) {
            CycleStart::Started(guard) => guard,
            CycleStart::AlreadyInFlight => {
                info!(device_id = %device_id, "Upload cycle already in flight, skipping");
                metrics::record_upload_cycle(device_id, "skipped", 0.0);
                return CycleOutcome::Skipped;
            }
            CycleStart::Stopped => return CycleOutcome::Discarded,
        };

        let started = Instant::now();
        let analysis = self.collect_and_analyze(device_id).await;

        let outcome = if is_stopped(shutdown) {
            info!(device_id = %device_id, "Discarding upload result received after stop");
            CycleOutcome::Discarded
        } else {
            match analysis {
                Ok(result) => CycleOutcome::Completed(self.react(device_id, result).await),
                Err(e) => {
                    let retryable = e.is_retryable();
                    if e.kind() == FailureKind::Collection {
                        warn!(device_id = %device_id, error = %e, retryable, "Monitoring data collection failed");
                    } else {
                        warn!(device_id = %device_id, kind = %e.kind(), error = %e, retryable, "Monitoring upload failed");
                    }
                    CycleOutcome::Failed(e)
                }
            }
        };

        self.finish_cycle(&guard, &outcome, started.elapsed());
        outcome
    }

    async fn collect_and_analyze(&self, device_id: &DeviceId) -> Result<AnalysisResult, CycleError> {
        let payload = self.collector.collect(device_id)?;
        debug!(
            device_id = %device_id,
            messages = payload.messages.len(),
            contacts = payload.contacts.len(),
            apps = payload.app_usage.len(),
            "Collected monitoring payload"
        );

        let result = self.client.analyze(payload).await?;
        Ok(result)
    }

    /// Raise an alert for high-risk results. Sink failures never fail the cycle.
    async fn react(&self, device_id: &DeviceId, result: AnalysisResult) -> CycleReport {
        let risk_level = result.risk_level;
        let threshold = self.settings.high_risk_threshold;

        if !result.is_high_risk(threshold) {
            debug!(device_id = %device_id, risk_level, threshold, "Analysis below alert threshold");
            return CycleReport {
                risk_level,
                alert: AlertDisposition::NotRequired,
            };
        }

        let alert = RiskAlert::from_analysis(device_id.clone(), &result);
        let disposition = match self.alert_sink.raise(&alert).await {
            Ok(()) => {
                info!(
                    device_id = %device_id,
                    alert_id = %alert.id,
                    risk_level,
                    priority = %alert.priority,
                    "Risk alert raised"
                );
                metrics::record_alert(true);
                AlertDisposition::Delivered(alert.id)
            }
            Err(e) => {
                error!(
                    device_id = %device_id,
                    alert_id = %alert.id,
                    risk_level,
                    error = %e,
                    "Failed to deliver risk alert"
                );
                metrics::record_alert(false);
                AlertDisposition::Failed {
                    alert_id: alert.id,
                    error: e.to_string(),
                }
            }
        };

        CycleReport {
            risk_level,
            alert: disposition,
        }
    }

    fn finish_cycle(&self, guard: &InFlightGuard, outcome: &CycleOutcome, elapsed: Duration) {
        let device_id = &guard.device_id;
        let now = Utc::now();
        let mut state = self.lock_state();
        let running = state.timelines.contains_key(device_id);
        let status = state.status_mut(device_id);

        match outcome {
            CycleOutcome::Completed(report) => {
                status.cycles_completed += 1;
                status.consecutive_failures = 0;
                status.last_success_at = Some(now);
                status.last_risk_level = Some(report.risk_level);
                match &report.alert {
                    AlertDisposition::NotRequired => {}
                    AlertDisposition::Delivered(_) => status.alerts_raised += 1,
                    AlertDisposition::Failed { error, .. } => {
                        status.last_failure = Some(UploadFailure {
                            kind: FailureKind::AlertDelivery,
                            message: error.clone(),
                            retryable: true,
                            at: now,
                        });
                    }
                }
            }
            CycleOutcome::Failed(error) => {
                status.cycles_completed += 1;
                status.consecutive_failures = status.consecutive_failures.saturating_add(1);
                status.last_failure = Some(UploadFailure::from_error(error, now));
            }
            CycleOutcome::Skipped | CycleOutcome::Discarded => {}
        }

        status.state = match (outcome, running) {
            (_, true) => UploadState::Scheduled,
            (CycleOutcome::Discarded, false) => UploadState::Stopped,
            (_, false) => guard.resume_state,
        };
        let consecutive_failures = status.consecutive_failures;
        drop(state);

        metrics::record_upload_cycle(device_id, outcome.metric_label(), elapsed.as_secs_f64());
        metrics::record_consecutive_failures(device_id, consecutive_failures);
    }

    /// Pick the delay before the next cycle, or `None` if the timeline was stopped.
    fn schedule_next(
        &self,
        device_id: &DeviceId,
        outcome: &CycleOutcome,
        shutdown_rx: &watch::Receiver<bool>,
    ) -> Option<Duration> {
        let backoff = &self.settings.backoff;
        let mut state = self.lock_state();

        if *shutdown_rx.borrow() {
            return None;
        }

        let status = state.status_mut(device_id);
        let delay = match outcome {
            CycleOutcome::Completed(_) | CycleOutcome::Skipped => backoff.success_delay(),
            CycleOutcome::Failed(error) => {
                backoff.failure_delay(status.consecutive_failures, error.is_retryable())
            }
            CycleOutcome::Discarded => return None,
        };

        status.next_cycle_at = chrono::Duration::from_std(delay)
            .ok()
            .map(|d| Utc::now() + d);
        let consecutive_failures = status.consecutive_failures;
        drop(state);

        debug!(
            device_id = %device_id,
            delay_ms = delay.as_millis() as u64,
            consecutive_failures,
            "Next upload cycle scheduled"
        );
        metrics::record_next_delay(device_id, delay.as_secs_f64());

        Some(delay)
    }
}

fn is_stopped(shutdown: Option<&watch::Receiver<bool>>) -> bool {
    shutdown.is_some_and(|rx| *rx.borrow())
}
