//! Prometheus metrics.
//!
//! HTTP request metrics for the status surface plus the upload cycle
//! metrics recorded by the scheduler and the analysis circuit breaker.

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

use domain::models::DeviceId;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Middleware to record HTTP request metrics.
///
/// Records the following metrics:
/// - `http_requests_total`: Counter with labels (method, path, status)
/// - `http_request_duration_seconds`: Histogram with labels (method, path)
pub async fn metrics_middleware(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().as_str().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();

    counter!(
        "http_requests_total",
        "method" => method.clone(),
        "path" => path.clone(),
        "status" => status
    )
    .increment(1);

    histogram!(
        "http_request_duration_seconds",
        "method" => method,
        "path" => path
    )
    .record(start.elapsed().as_secs_f64());

    response
}

/// Record the outcome of one upload cycle.
///
/// `outcome` is `success`, `skipped` or the failure kind.
pub fn record_upload_cycle(device_id: &DeviceId, outcome: &'static str, duration_secs: f64) {
    counter!(
        "upload_cycles_total",
        "device_id" => device_id.to_string(),
        "outcome" => outcome
    )
    .increment(1);

    histogram!("upload_cycle_duration_seconds", "outcome" => outcome).record(duration_secs);
}

pub fn record_consecutive_failures(device_id: &DeviceId, failures: u32) {
    gauge!("upload_consecutive_failures", "device_id" => device_id.to_string())
        .set(failures as f64);
}

pub fn record_next_delay(device_id: &DeviceId, delay_secs: f64) {
    gauge!("upload_next_delay_seconds", "device_id" => device_id.to_string()).set(delay_secs);
}

pub fn record_alert(delivered: bool) {
    let result = if delivered { "delivered" } else { "failed" };
    counter!("risk_alerts_total", "result" => result).increment(1);
}

/// 0 = closed, 1 = half open, 2 = open.
pub fn record_circuit_state(value: u8) {
    gauge!("analysis_circuit_state").set(value as f64);
}

/// Handler for /metrics endpoint that returns Prometheus text format.
pub async fn metrics_handler() -> impl IntoResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain")],
            "Metrics not initialized".to_string(),
        ),
    }
}

/// Initialize the Prometheus metrics recorder.
///
/// Must be called once during startup before any metrics are recorded.
/// A second call is a no-op.
pub fn init_metrics() -> Result<(), BuildError> {
    if PROMETHEUS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets(&[0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0])?
        .install_recorder()?;

    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("Prometheus handle already initialized");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_handler_without_recorder() {
        // No recorder is installed in unit tests
        if PROMETHEUS_HANDLE.get().is_none() {
            let response = metrics_handler().await.into_response();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let device = DeviceId::new("dev-1");
        record_upload_cycle(&device, "success", 0.2);
        record_consecutive_failures(&device, 3);
        record_next_delay(&device, 900.0);
        record_alert(true);
        record_circuit_state(2);
    }
}
