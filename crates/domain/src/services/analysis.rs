//! Remote analysis contract.

use crate::error::AnalysisError;
use crate::models::{AnalysisResult, MonitoringPayload};

/// Classifies a monitoring payload into a risk assessment.
#[async_trait::async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Send the payload for analysis. The payload is consumed by the request.
    async fn analyze(&self, payload: MonitoringPayload) -> Result<AnalysisResult, AnalysisError>;
}
