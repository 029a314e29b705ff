//! Alerts raised for the parent when a payload is classified as high risk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AnalysisResult, DeviceId};

/// Alert priority derived from the risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPriority {
    Low,
    Medium,
    High,
}

impl AlertPriority {
    pub fn from_risk_level(risk_level: i32) -> Self {
        match risk_level {
            i32::MIN..=3 => AlertPriority::Low,
            4..=6 => AlertPriority::Medium,
            _ => AlertPriority::High,
        }
    }
}

impl std::fmt::Display for AlertPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertPriority::Low => write!(f, "low"),
            AlertPriority::Medium => write!(f, "medium"),
            AlertPriority::High => write!(f, "high"),
        }
    }
}

/// A user-visible alert handed to an [`AlertSink`](crate::services::AlertSink).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAlert {
    pub id: Uuid,
    pub device_id: DeviceId,
    pub risk_level: i32,
    pub priority: AlertPriority,
    pub concerns: Vec<String>,
    pub recommendations: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl RiskAlert {
    /// Build an alert from an analysis result.
    pub fn from_analysis(device_id: DeviceId, result: &AnalysisResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id,
            risk_level: result.risk_level,
            priority: AlertPriority::from_risk_level(result.risk_level),
            concerns: result.concerns.clone(),
            recommendations: result.recommendations.clone(),
            created_at: Utc::now(),
        }
    }

    /// Short headline for notifications.
    pub fn title(&self) -> String {
        format!(
            "High risk activity detected (level {}) on device {}",
            self.risk_level, self.device_id
        )
    }

    /// Concerns and recommendations flattened into a single message body.
    pub fn details(&self) -> String {
        let mut lines = Vec::with_capacity(self.concerns.len() + self.recommendations.len() + 2);
        if !self.concerns.is_empty() {
            lines.push("Concerns:".to_string());
            lines.extend(self.concerns.iter().map(|c| format!("- {c}")));
        }
        if !self.recommendations.is_empty() {
            lines.push("Recommendations:".to_string());
            lines.extend(self.recommendations.iter().map(|r| format!("- {r}")));
        }
        lines.join("\n")
    }
}
