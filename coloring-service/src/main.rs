use coloring_service::config::ColoringConfig;
use coloring_service::services::init_metrics;
use coloring_service::startup::{log_access_banner, Application};
use service_core::observability::init_tracing;
use tokio::signal;
use tokio_util::sync::CancellationToken;

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, stopping server");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, stopping server");
        },
        _ = token.cancelled() => return,
    }

    token.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ColoringConfig::load().map_err(|e| {
        eprintln!("Failed to read configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    init_tracing(
        "coloring-service",
        &config.common.log_level,
        config.common.otlp_endpoint.as_deref(),
    );

    // Must be installed before any metrics are recorded.
    init_metrics();

    let app = Application::build(config).await.map_err(|e| {
        tracing::error!("Failed to start coloring-service: {}", e);
        anyhow::anyhow!("Startup error: {}", e)
    })?;

    log_access_banner(app.port(), app.invoker()).await;

    tokio::spawn(shutdown_signal(app.shutdown_token()));

    app.run_until_stopped().await.map_err(|e| {
        tracing::error!("Server error: {}", e);
        anyhow::anyhow!("Server error: {}", e)
    })?;

    Ok(())
}
