//! Collaborators of the upload scheduler.

pub mod alert_sinks;
pub mod analysis_client;
pub mod circuit_breaker;
pub mod snapshot_collector;

pub use alert_sinks::{LogAlertSink, WebhookAlertSink};
pub use analysis_client::HttpAnalysisClient;
pub use circuit_breaker::{CircuitBreaker, CircuitState, GuardedAnalysisClient};
pub use snapshot_collector::SnapshotFileCollector;
