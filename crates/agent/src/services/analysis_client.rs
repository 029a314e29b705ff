//! HTTP client for the remote analysis endpoint.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};
use validator::Validate;

use domain::error::AnalysisError;
use domain::models::{AnalysisResult, MonitoringPayload};
use domain::services::AnalysisClient;

use crate::config::AnalysisConfig;

/// Path of the analysis operation, relative to the configured base URL.
pub const ANALYZE_PATH: &str = "/api/analyze";

/// Header carrying the optional API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Longest error body kept in an error message.
const MAX_ERROR_BODY_CHARS: usize = 256;

/// Posts monitoring payloads as JSON and parses the risk assessment.
pub struct HttpAnalysisClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    timeout_ms: u64,
}

impl HttpAnalysisClient {
    /// Create a new analysis client.
    pub fn new(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", config.base_url.trim_end_matches('/'), ANALYZE_PATH),
            api_key: config.api_key.clone().filter(|key| !key.is_empty()),
            timeout_ms: config.timeout_ms,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AnalysisClient for HttpAnalysisClient {
    async fn analyze(&self, payload: MonitoringPayload) -> Result<AnalysisResult, AnalysisError> {
        let device_id = payload.device_id.clone();
        let start = Instant::now();

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.header(API_KEY_HEADER, api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AnalysisError::Timeout(self.timeout_ms)
            } else {
                AnalysisError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                device_id = %device_id,
                status = status.as_u16(),
                "Analysis endpoint returned non-2xx status"
            );
            return Err(AnalysisError::Server {
                status: status.as_u16(),
                message: truncate(&body, MAX_ERROR_BODY_CHARS),
            });
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                AnalysisError::Timeout(self.timeout_ms)
            } else {
                AnalysisError::Transport(e.to_string())
            }
        })?;

        let result: AnalysisResult = serde_json::from_slice(&body)
            .map_err(|e| AnalysisError::MalformedResponse(e.to_string()))?;
        result
            .validate()
            .map_err(|e| AnalysisError::MalformedResponse(e.to_string()))?;

        debug!(
            device_id = %device_id,
            risk_level = result.risk_level,
            concerns = result.concerns.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Analysis completed"
        );

        Ok(result)
    }
}

fn truncate(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
