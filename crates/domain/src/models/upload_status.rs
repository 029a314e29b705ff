//! Per-device upload status.
//!
//! Exposes whether uploads are currently failing, which the original client
//! never surfaced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DeviceId;
use crate::error::{CycleError, FailureKind};

/// Lifecycle state of a device's upload timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    /// Never started.
    Idle,
    /// Waiting for the next cycle.
    Scheduled,
    /// A network exchange is pending.
    InFlight,
    /// Stopped by the owner; no further cycles until started again.
    Stopped,
}

impl std::fmt::Display for UploadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadState::Idle => write!(f, "idle"),
            UploadState::Scheduled => write!(f, "scheduled"),
            UploadState::InFlight => write!(f, "in_flight"),
            UploadState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Last failure recorded for a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFailure {
    pub kind: FailureKind,
    pub message: String,
    pub retryable: bool,
    pub at: DateTime<Utc>,
}

impl UploadFailure {
    pub fn from_error(error: &CycleError, at: DateTime<Utc>) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            retryable: error.is_retryable(),
            at,
        }
    }
}

/// Snapshot of a device's upload health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatus {
    pub device_id: DeviceId,
    pub state: UploadState,
    pub cycles_completed: u64,
    pub consecutive_failures: u32,
    pub alerts_raised: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_risk_level: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<UploadFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cycle_at: Option<DateTime<Utc>>,
}

impl UploadStatus {
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            state: UploadState::Idle,
            cycles_completed: 0,
            consecutive_failures: 0,
            alerts_raised: 0,
            last_attempt_at: None,
            last_success_at: None,
            last_risk_level: None,
            last_failure: None,
            next_cycle_at: None,
        }
    }

    /// Uploads have failed since the last successful exchange.
    pub fn is_failing(&self) -> bool {
        self.consecutive_failures > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;

    #[test]
    fn test_new_status_is_idle_and_healthy() {
        let status = UploadStatus::new(DeviceId::new("dev-1"));
        assert_eq!(status.state, UploadState::Idle);
        assert!(!status.is_failing());
        assert!(status.last_failure.is_none());
    }

    #[test]
    fn test_failure_from_error() {
        let error: CycleError = AnalysisError::Timeout(5000).into();
        let failure = UploadFailure::from_error(&error, Utc::now());
        assert_eq!(failure.kind, FailureKind::Transport);
        assert!(failure.retryable);
        assert!(failure.message.contains("5000ms"));
    }

    #[test]
    fn test_status_serialization_skips_empty_fields() {
        let mut status = UploadStatus::new(DeviceId::new("dev-2"));
        status.state = UploadState::InFlight;
        status.consecutive_failures = 2;

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"state\":\"in_flight\""));
        assert!(json.contains("\"consecutiveFailures\":2"));
        assert!(!json.contains("lastFailure"));
        assert!(status.is_failing());
    }
}
