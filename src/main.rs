use std::net::SocketAddr;
use std::sync::Arc;

use attack_compare_service::config::load_config;
use attack_compare_service::service::{router, AppState};
use attack_compare_service::utils::{init_logging, CompareError, CompareResult};
use metrics_exporter_prometheus::PrometheusBuilder;

#[tokio::main]
async fn main() -> CompareResult<()> {
    // Initialize logging
    init_logging();
    tracing::info!("Starting attack comparison service...");

    // Load configuration
    let settings = load_config()?;
    tracing::info!("Configuration loaded successfully");

    if settings.storage.table_service_uri.is_none() && settings.storage.connection_string.is_none() {
        tracing::warn!("No counter table configured; rate limiting is disabled");
    }

    let metrics = PrometheusBuilder::new().install_recorder()?;
    let state = Arc::new(AppState::from_settings(&settings)?.with_metrics(metrics));

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse::<SocketAddr>()
        .map_err(|e| CompareError::Internal(format!("invalid listen address: {}", e)))?;

    tracing::info!(
        host = %settings.server.host,
        port = %settings.server.port,
        "Listening for comparison requests"
    );

    axum::Server::bind(&addr)
        .serve(router(state).into_make_service())
        .await
        .map_err(|e| CompareError::Internal(e.to_string()))?;

    Ok(())
}
