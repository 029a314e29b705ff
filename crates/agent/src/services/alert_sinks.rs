//! Alert sink implementations.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use domain::error::AlertDeliveryError;
use domain::models::RiskAlert;
use domain::services::AlertSink;
use shared::crypto::{sign_payload, SIGNATURE_HEADER};

/// Header carrying the alert id so receivers can deduplicate.
pub const ALERT_ID_HEADER: &str = "X-Alert-Id";

/// Writes alerts to the structured log.
///
/// Used when no webhook is configured.
#[derive(Debug, Default, Clone)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn raise(&self, alert: &RiskAlert) -> Result<(), AlertDeliveryError> {
        warn!(
            alert_id = %alert.id,
            device_id = %alert.device_id,
            risk_level = alert.risk_level,
            priority = %alert.priority,
            concerns = ?alert.concerns,
            recommendations = ?alert.recommendations,
            "{}",
            alert.title()
        );
        Ok(())
    }
}

/// Webhook body for a risk alert.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AlertWebhookPayload<'a> {
    event_type: &'static str,
    title: String,
    details: String,
    #[serde(flatten)]
    alert: &'a RiskAlert,
}

/// Posts alerts to the parent's webhook, signed with HMAC-SHA256.
pub struct WebhookAlertSink {
    client: Client,
    url: String,
    secret: String,
}

impl WebhookAlertSink {
    pub fn new(url: &str, secret: &str, timeout: Duration) -> Result<Self, AlertDeliveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AlertDeliveryError::Delivery(e.to_string()))?;

        Ok(Self {
            client,
            url: url.to_string(),
            secret: secret.to_string(),
        })
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn raise(&self, alert: &RiskAlert) -> Result<(), AlertDeliveryError> {
        let payload = AlertWebhookPayload {
            event_type: "risk_alert",
            title: alert.title(),
            details: alert.details(),
            alert,
        };
        let body = serde_json::to_vec(&payload)
            .map_err(|e| AlertDeliveryError::Delivery(format!("Serialization error: {e}")))?;
        let signature = sign_payload(&body, &self.secret)
            .map_err(|e| AlertDeliveryError::Delivery(e.to_string()))?;

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header(ALERT_ID_HEADER, alert.id.to_string())
            .body(body)
            .send()
            .await
            .map_err(|e| AlertDeliveryError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                alert_id = %alert.id,
                target_url = %self.url,
                status_code = status.as_u16(),
                "Alert webhook returned non-2xx status"
            );
            return Err(AlertDeliveryError::Rejected(status.as_u16()));
        }

        info!(
            alert_id = %alert.id,
            target_url = %self.url,
            status_code = status.as_u16(),
            "Alert webhook delivered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::{AnalysisResult, DeviceId};

    fn alert() -> RiskAlert {
        RiskAlert::from_analysis(
            DeviceId::new("dev-1"),
            &AnalysisResult {
                risk_level: 8,
                concerns: vec!["Late night chats".to_string()],
                recommendations: vec!["Talk to your child".to_string()],
            },
        )
    }

    #[tokio::test]
    async fn test_log_sink_always_succeeds() {
        assert!(LogAlertSink.raise(&alert()).await.is_ok());
    }

    #[test]
    fn test_webhook_payload_shape() {
        let alert = alert();
        let payload = AlertWebhookPayload {
            event_type: "risk_alert",
            title: alert.title(),
            details: alert.details(),
            alert: &alert,
        };

        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["eventType"], "risk_alert");
        assert_eq!(json["riskLevel"], 8);
        assert_eq!(json["priority"], "high");
        assert_eq!(json["deviceId"], "dev-1");
        assert!(json["details"].as_str().unwrap().contains("Late night chats"));
    }

    #[tokio::test]
    async fn test_unreachable_webhook_fails_delivery() {
        let sink =
            WebhookAlertSink::new("http://127.0.0.1:9/hook", "secret", Duration::from_secs(1))
                .unwrap();

        let result = sink.raise(&alert()).await;

        assert!(matches!(result, Err(AlertDeliveryError::Delivery(_))));
    }
}
