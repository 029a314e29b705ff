//! Upload scheduling.

mod backoff;
mod upload_scheduler;

pub use backoff::BackoffPolicy;
pub use upload_scheduler::{
    AlertDisposition, CycleOutcome, CycleReport, SchedulerSettings, UploadScheduler,
};
