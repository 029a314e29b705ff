//! Domain models for the monitoring agent.

pub mod alert;
pub mod analysis;
pub mod device;
pub mod monitoring;
pub mod upload_status;

pub use alert::{AlertPriority, RiskAlert};
pub use analysis::{AnalysisResult, MAX_RISK_LEVEL, MIN_RISK_LEVEL};
pub use device::DeviceId;
pub use monitoring::MonitoringPayload;
pub use upload_status::{UploadFailure, UploadState, UploadStatus};
