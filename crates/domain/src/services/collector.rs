//! Device data collection contract.

use crate::error::CollectionError;
use crate::models::{DeviceId, MonitoringPayload};

/// Produces the payload for one upload cycle.
///
/// Collection is expected to be fast and synchronous. Implementations
/// report unavailable sources (for example a revoked permission) as
/// [`CollectionError`] instead of panicking.
pub trait DeviceDataCollector: Send + Sync {
    fn collect(&self, device_id: &DeviceId) -> Result<MonitoringPayload, CollectionError>;
}
