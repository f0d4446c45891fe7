//! # civic-api: Binary Entry Point
//!
//! Starts the Axum HTTP server for the service request API.
//! Binds to the configured port (default 8080).

use std::sync::Arc;

use civic_api::db::requests::PgRequestStore;
use civic_api::state::{AppConfig, AppState, LogFormat};
use civic_workflow::{MemoryStore, WorkflowStore};
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(config.log_format);
    tracing::info!(?config, "configuration loaded");

    let pool = civic_api::db::init_pool().await.map_err(|e| {
        tracing::error!("Database initialization failed: {e}");
        e
    })?;
    let store: Arc<dyn WorkflowStore> = match pool {
        Some(pool) => Arc::new(PgRequestStore::new(pool)),
        None => Arc::new(MemoryStore::new()),
    };

    let port = config.port;
    let mut state = AppState::with_store(config, store);
    match civic_api::middleware::metrics::install_recorder() {
        Ok(handle) => state = state.with_metrics(handle),
        Err(e) => tracing::warn!("Prometheus recorder not installed: {e}. /metrics disabled."),
    }

    let app = civic_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("civic-api listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("civic-api stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
