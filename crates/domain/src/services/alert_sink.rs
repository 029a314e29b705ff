//! Alert sink contract.

use std::sync::Mutex;

use crate::error::AlertDeliveryError;
use crate::models::RiskAlert;

/// Consumes high-risk alerts and makes them visible to the parent.
#[async_trait::async_trait]
pub trait AlertSink: Send + Sync {
    async fn raise(&self, alert: &RiskAlert) -> Result<(), AlertDeliveryError>;
}

/// Mock alert sink for development and testing.
///
/// Records every alert it receives instead of delivering it.
#[derive(Debug, Default)]
pub struct MockAlertSink {
    /// Whether to simulate failures for testing.
    pub simulate_failure: bool,
    raised: Mutex<Vec<RiskAlert>>,
}

impl MockAlertSink {
    /// Create a new mock alert sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock sink that records alerts and then fails delivery.
    pub fn failing() -> Self {
        Self {
            simulate_failure: true,
            raised: Mutex::new(Vec::new()),
        }
    }

    /// Alerts received so far.
    pub fn raised(&self) -> Vec<RiskAlert> {
        self.raised
            .lock()
            .map(|alerts| alerts.clone())
            .unwrap_or_default()
    }

    pub fn raised_count(&self) -> usize {
        self.raised.lock().map(|alerts| alerts.len()).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl AlertSink for MockAlertSink {
    async fn raise(&self, alert: &RiskAlert) -> Result<(), AlertDeliveryError> {
        if let Ok(mut raised) = self.raised.lock() {
            raised.push(alert.clone());
        }

        if self.simulate_failure {
            tracing::warn!(
                alert_id = %alert.id,
                device_id = %alert.device_id,
                "Mock alert sink simulating failure"
            );
            return Err(AlertDeliveryError::Delivery("Simulated failure".to_string()));
        }

        tracing::info!(
            alert_id = %alert.id,
            device_id = %alert.device_id,
            risk_level = alert.risk_level,
            concerns = alert.concerns.len(),
            "Mock: Would raise risk alert"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalysisResult, DeviceId};

    fn alert() -> RiskAlert {
        RiskAlert::from_analysis(
            DeviceId::new("dev-1"),
            &AnalysisResult {
                risk_level: 9,
                concerns: vec!["Stranger contact".to_string()],
                recommendations: vec![],
            },
        )
    }

    #[tokio::test]
    async fn test_mock_alert_sink_records_alerts() {
        let sink = MockAlertSink::new();
        let alert = alert();

        sink.raise(&alert).await.unwrap();

        assert_eq!(sink.raised_count(), 1);
        assert_eq!(sink.raised()[0].id, alert.id);
    }

    #[tokio::test]
    async fn test_mock_alert_sink_failure() {
        let sink = MockAlertSink::failing();

        let result = sink.raise(&alert()).await;

        assert!(matches!(result, Err(AlertDeliveryError::Delivery(_))));
        assert_eq!(sink.raised_count(), 1);
    }
}
