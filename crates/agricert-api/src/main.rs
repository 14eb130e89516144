//! # agricert-api: Binary Entry Point
//!
//! Starts the Axum HTTP server for the certification API.
//! Binds to `PORT` (default 3000).

use agricert_api::middleware::metrics::install_prometheus;
use agricert_api::state::{AppConfig, AppState, LogFormat};
use agricert_api::store::Ledger;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(?config, "configuration loaded");

    let prometheus = if config.metrics_enabled {
        Some(install_prometheus().map_err(|e| {
            tracing::error!("Prometheus recorder installation failed: {e}");
            e
        })?)
    } else {
        None
    };

    // Database pool is optional; absent means in-memory only.
    let pool = agricert_api::db::init_pool(config.database_url.as_deref())
        .await
        .map_err(|e| {
            tracing::error!("Database initialization failed: {e}");
            e
        })?;
    let ledger = match pool {
        Some(pool) => Ledger::connect(pool).await.map_err(|e| {
            tracing::error!("Ledger hydration failed: {e}");
            e
        })?,
        None => Ledger::in_memory().with_log_capacity(config.verification_log_capacity),
    };

    let repaired = ledger.reconcile_revocations().await?;
    if repaired > 0 {
        tracing::warn!(repaired, "repaired half-applied revocations");
    }

    let port = config.port;
    let mut state = AppState::build(config, ledger).map_err(|e| {
        tracing::error!("Startup failed: {e}");
        e
    })?;
    if let Some(handle) = prometheus {
        state = state.with_prometheus(handle);
    }

    let app = agricert_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("AgriCert API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
