//! Health check endpoint handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::app::AppState;
use crate::services::CircuitState;

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uploads: UploadsHealth,
    pub analysis: AnalysisHealth,
}

/// Upload timeline summary.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct UploadsHealth {
    pub active_timelines: usize,
    pub devices: usize,
    /// Devices whose last cycle failed.
    pub failing_devices: usize,
}

/// Analysis endpoint health status.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct AnalysisHealth {
    /// Whether requests are currently let through (circuit not open).
    pub available: bool,
    pub circuit_state: CircuitState,
    pub consecutive_failures: u32,
}

/// Simple status response for liveness/readiness probes.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

/// Full health check endpoint.
///
/// Reports `degraded` while the analysis circuit is open or any device is
/// failing to upload. The process itself is still serving, so the status
/// code stays 200.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let statuses = state.scheduler.statuses();
    let failing_devices = statuses.iter().filter(|s| s.is_failing()).count();
    let circuit_state = state.circuit.state();
    let available = circuit_state != CircuitState::Open;

    let healthy = available && failing_devices == 0;

    Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uploads: UploadsHealth {
            active_timelines: state.scheduler.active_timelines(),
            devices: statuses.len(),
            failing_devices,
        },
        analysis: AnalysisHealth {
            available,
            circuit_state,
            consecutive_failures: state.circuit.consecutive_failures(),
        },
    })
}

/// Liveness probe endpoint.
///
/// Returns 200 OK if the process is running.
pub async fn live() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "alive".to_string(),
    })
}

/// Readiness probe endpoint.
///
/// Returns 200 OK once at least one upload timeline is running.
pub async fn ready(State(state): State<AppState>) -> Result<Json<StatusResponse>, StatusCode> {
    if state.scheduler.active_timelines() > 0 {
        Ok(Json(StatusResponse {
            status: "ready".to_string(),
        }))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "degraded".to_string(),
            version: "0.3.0".to_string(),
            uploads: UploadsHealth {
                active_timelines: 1,
                devices: 1,
                failing_devices: 1,
            },
            analysis: AnalysisHealth {
                available: false,
                circuit_state: CircuitState::Open,
                consecutive_failures: 5,
            },
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["uploads"]["failing_devices"], 1);
        assert_eq!(json["analysis"]["circuit_state"], "open");
    }

    #[tokio::test]
    async fn test_live() {
        let Json(response) = live().await;
        assert_eq!(response.status, "alive");
    }
}
