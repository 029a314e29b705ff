use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

use domain::error::{AlertDeliveryError, AnalysisError};
use domain::models::DeviceId;
use domain::services::AlertSink;

use crate::config::{Config, DeviceConfig};
use crate::jobs::{SchedulerSettings, UploadScheduler};
use crate::middleware::{metrics_handler, metrics_middleware};
use crate::routes::{health, uploads};
use crate::services::{
    CircuitBreaker, GuardedAnalysisClient, HttpAnalysisClient, LogAlertSink,
    SnapshotFileCollector, WebhookAlertSink,
};

#[derive(Clone)]
pub struct AppState {
    pub scheduler: UploadScheduler,
    pub circuit: Arc<CircuitBreaker>,
    pub config: Arc<Config>,
}

/// Errors raised while wiring the agent from configuration.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Failed to create analysis client: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Failed to create alert sink: {0}")]
    AlertSink(#[from] AlertDeliveryError),
}

impl AppState {
    /// Wire the scheduler and its collaborators from configuration.
    ///
    /// Does not start any timeline.
    pub fn from_config(config: Config) -> Result<Self, BuildError> {
        let circuit = Arc::new(CircuitBreaker::new(
            config.analysis.circuit_breaker_failures,
            Duration::from_secs(config.analysis.circuit_breaker_reset_secs),
        ));
        let client = GuardedAnalysisClient::new(
            HttpAnalysisClient::new(&config.analysis)?,
            Arc::clone(&circuit),
        );

        let alert_sink: Arc<dyn AlertSink> = match config.alerts.webhook() {
            Some((url, secret)) => {
                info!(target_url = %url, "Delivering risk alerts to webhook");
                Arc::new(WebhookAlertSink::new(
                    url,
                    secret,
                    Duration::from_secs(config.alerts.webhook_timeout_secs),
                )?)
            }
            None => {
                info!("No alert webhook configured, risk alerts are logged only");
                Arc::new(LogAlertSink)
            }
        };

        let collector = SnapshotFileCollector::new(&config.collector.snapshot_dir);

        let scheduler = UploadScheduler::new(
            Arc::new(collector),
            Arc::new(client),
            alert_sink,
            SchedulerSettings::from_config(&config.upload),
        );

        Ok(Self {
            scheduler,
            circuit,
            config: Arc::new(config),
        })
    }
}

/// Devices to monitor.
///
/// Falls back to a single generated identifier when none are configured.
pub fn resolve_device_ids(config: &DeviceConfig) -> Vec<DeviceId> {
    let ids: Vec<DeviceId> = config
        .ids
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(DeviceId::from)
        .collect();

    if !ids.is_empty() {
        return ids;
    }

    let generated = DeviceId::generate();
    warn!(
        device_id = %generated,
        "No device ids configured, generated one that will not survive a restart"
    );
    vec![generated]
}

pub fn create_app(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    let upload_routes = Router::new()
        .route("/api/v1/uploads", get(uploads::list_uploads))
        .route("/api/v1/uploads/:device_id", get(uploads::get_upload));

    Router::new()
        .merge(public_routes)
        .merge(upload_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
