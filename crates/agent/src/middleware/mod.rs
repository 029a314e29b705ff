//! HTTP middleware and process-wide instrumentation.

pub mod logging;
pub mod metrics;

pub use self::metrics::{init_metrics, metrics_handler, metrics_middleware};
