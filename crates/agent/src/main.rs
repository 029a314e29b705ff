use anyhow::Result;
use tracing::{info, warn};

use guardian_agent::{app, config, middleware};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Load configuration
    let config = config::Config::load()?;

    // Initialize logging
    middleware::logging::init_logging(&config.logging)?;

    info!("Starting Guardian agent v{}", env!("CARGO_PKG_VERSION"));

    middleware::init_metrics()?;

    let addr = config.socket_addr()?;
    let device_ids = app::resolve_device_ids(&config.device);
    let shutdown_timeout = config.upload.shutdown_timeout();

    let state = app::AppState::from_config(config)?;
    let scheduler = state.scheduler.clone();

    for device_id in device_ids {
        scheduler.start(device_id);
    }

    let app = app::create_app(state);

    info!("Status server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down upload timelines");
    scheduler.shutdown(shutdown_timeout).await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
