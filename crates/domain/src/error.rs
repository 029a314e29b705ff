//! Error taxonomy for upload cycles.
//!
//! Every failure carries an explicit [`FailureKind`] and a retryable flag so
//! the scheduler can pick a delay instead of retrying blindly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a cycle failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Local data gathering failed.
    Collection,
    /// The analysis endpoint could not be reached.
    Transport,
    /// The analysis endpoint was reached but rejected the request or answered garbage.
    Server,
    /// The alert sink failed to notify. Recorded in the status only; it never fails a cycle.
    AlertDelivery,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Collection => "collection",
            FailureKind::Transport => "transport",
            FailureKind::Server => "server",
            FailureKind::AlertDelivery => "alert_delivery",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while collecting device data.
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("Permission revoked for data source: {0}")]
    PermissionRevoked(String),

    #[error("Data source unavailable: {0}")]
    SourceUnavailable(String),
}

impl CollectionError {
    /// A revoked permission will not come back on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CollectionError::SourceUnavailable(_))
    }
}

/// Errors raised by an analysis client.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Analysis endpoint circuit is open, request not sent")]
    CircuitOpen,

    #[error("Analysis endpoint returned status {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Malformed analysis response: {0}")]
    MalformedResponse(String),
}

impl AnalysisError {
    pub fn kind(&self) -> FailureKind {
        match self {
            AnalysisError::Transport(_) | AnalysisError::Timeout(_) | AnalysisError::CircuitOpen => {
                FailureKind::Transport
            }
            AnalysisError::Server { .. } | AnalysisError::MalformedResponse(_) => {
                FailureKind::Server
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            AnalysisError::Transport(_) | AnalysisError::Timeout(_) | AnalysisError::CircuitOpen => {
                true
            }
            AnalysisError::Server { status, .. } => is_retryable_status(*status),
            AnalysisError::MalformedResponse(_) => false,
        }
    }

    /// Whether this failure says something about endpoint health.
    ///
    /// Rejections and malformed bodies come from a reachable endpoint and
    /// do not count against it.
    pub fn is_endpoint_failure(&self) -> bool {
        match self {
            AnalysisError::Transport(_) | AnalysisError::Timeout(_) => true,
            AnalysisError::Server { status, .. } => is_retryable_status(*status),
            AnalysisError::CircuitOpen | AnalysisError::MalformedResponse(_) => false,
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

/// Errors raised by an alert sink.
#[derive(Debug, Error)]
pub enum AlertDeliveryError {
    #[error("Alert delivery failed: {0}")]
    Delivery(String),

    #[error("Alert endpoint rejected alert with status {0}")]
    Rejected(u16),
}

/// Failure of a single upload cycle.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

impl CycleError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CycleError::Collection(_) => FailureKind::Collection,
            CycleError::Analysis(e) => e.kind(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            CycleError::Collection(e) => e.is_retryable(),
            CycleError::Analysis(e) => e.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(status: u16) -> AnalysisError {
        AnalysisError::Server {
            status,
            message: String::new(),
        }
    }

    #[test]
    fn test_failure_kind_display() {
        assert_eq!(FailureKind::Collection.to_string(), "collection");
        assert_eq!(FailureKind::Transport.to_string(), "transport");
        assert_eq!(FailureKind::Server.to_string(), "server");
        assert_eq!(FailureKind::AlertDelivery.to_string(), "alert_delivery");
    }

    #[test]
    fn test_analysis_error_kinds() {
        assert_eq!(
            AnalysisError::Transport("refused".into()).kind(),
            FailureKind::Transport
        );
        assert_eq!(AnalysisError::Timeout(30_000).kind(), FailureKind::Transport);
        assert_eq!(AnalysisError::CircuitOpen.kind(), FailureKind::Transport);
        assert_eq!(server(500).kind(), FailureKind::Server);
        assert_eq!(
            AnalysisError::MalformedResponse("eof".into()).kind(),
            FailureKind::Server
        );
    }

    #[test]
    fn test_server_status_retryability() {
        assert!(server(500).is_retryable());
        assert!(server(503).is_retryable());
        assert!(server(429).is_retryable());
        assert!(server(408).is_retryable());
        assert!(!server(400).is_retryable());
        assert!(!server(401).is_retryable());
        assert!(!server(422).is_retryable());
    }

    #[test]
    fn test_endpoint_failures() {
        assert!(AnalysisError::Timeout(10).is_endpoint_failure());
        assert!(server(502).is_endpoint_failure());
        assert!(!server(400).is_endpoint_failure());
        assert!(!AnalysisError::CircuitOpen.is_endpoint_failure());
        assert!(!AnalysisError::MalformedResponse("x".into()).is_endpoint_failure());
    }

    #[test]
    fn test_cycle_error_classification() {
        let revoked: CycleError = CollectionError::PermissionRevoked("sms".into()).into();
        assert_eq!(revoked.kind(), FailureKind::Collection);
        assert!(!revoked.is_retryable());

        let unavailable: CycleError = CollectionError::SourceUnavailable("usage".into()).into();
        assert!(unavailable.is_retryable());

        let transport: CycleError = AnalysisError::Transport("reset".into()).into();
        assert_eq!(transport.kind(), FailureKind::Transport);
        assert!(transport.is_retryable());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            AnalysisError::Timeout(1500).to_string(),
            "Request timeout after 1500ms"
        );
        assert_eq!(
            server(503).to_string(),
            "Analysis endpoint returned status 503: "
        );
        let err: CycleError = CollectionError::PermissionRevoked("contacts".into()).into();
        assert_eq!(
            err.to_string(),
            "Permission revoked for data source: contacts"
        );
    }
}
