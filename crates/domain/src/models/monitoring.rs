//! Monitoring payload uploaded on every cycle.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::DeviceId;

/// Telemetry collected from a child device for one upload cycle.
///
/// Built fresh per cycle and moved into the analysis request, so nothing
/// else holds on to it once it has been sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringPayload {
    pub device_id: DeviceId,
    #[serde(default)]
    pub messages: Vec<String>,
    #[serde(default)]
    pub contacts: Vec<String>,
    /// Usage duration in minutes keyed by package identifier.
    #[serde(default)]
    pub app_usage: BTreeMap<String, u64>,
}

impl MonitoringPayload {
    /// Create a payload with no collected data.
    pub fn empty(device_id: DeviceId) -> Self {
        Self {
            device_id,
            messages: Vec::new(),
            contacts: Vec::new(),
            app_usage: BTreeMap::new(),
        }
    }

    /// Total usage minutes across all packages.
    pub fn total_usage_minutes(&self) -> u64 {
        self.app_usage.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.contacts.is_empty() && self.app_usage.is_empty()
    }
}
