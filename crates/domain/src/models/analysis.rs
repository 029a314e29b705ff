//! Risk assessment returned by the analysis endpoint.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Lowest risk level the analysis endpoint may report.
pub const MIN_RISK_LEVEL: i32 = 0;

/// Highest risk level the analysis endpoint may report.
pub const MAX_RISK_LEVEL: i32 = 10;

/// Classification of one monitoring payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[validate(range(min = 0, max = 10, message = "riskLevel must be between 0 and 10"))]
    pub risk_level: i32,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl AnalysisResult {
    /// Whether this result reaches the inclusive alerting threshold.
    pub fn is_high_risk(&self, threshold: i32) -> bool {
        self.risk_level >= threshold
    }
}
