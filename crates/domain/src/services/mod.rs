//! Collaborator contracts consumed by the upload scheduler.
//!
//! Concrete implementations live with the agent; the mocks here are for
//! development and tests.

pub mod alert_sink;
pub mod analysis;
pub mod collector;

pub use alert_sink::{AlertSink, MockAlertSink};
pub use analysis::AnalysisClient;
pub use collector::DeviceDataCollector;
