//! fxgate Gateway Binary
//!
//! Serves currency conversions over HTTP.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fxgate_common::SystemClock;
use fxgate_fx::CoinbaseRateProvider;
use fxgate_gateway::{http, Gateway, GatewayConfig, GatewayStore, InMemoryStore, PgStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = GatewayConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting fxgate gateway");

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let store: Arc<dyn GatewayStore> = match &config.database_url {
        Some(url) => Arc::new(PgStore::connect(url).await?),
        None => {
            info!("DATABASE_URL not set, using in-memory store");
            Arc::new(InMemoryStore::new())
        }
    };

    let provider = Arc::new(CoinbaseRateProvider::with_base_url(config.upstream_url.clone()));
    let gateway = Gateway::from_config(&config, store, provider, SystemClock::shared())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let listener = TcpListener::bind(config.bind_addr()).await?;

    info!(
        listen_addr = %config.listen_addr,
        listen_port = %config.listen_port,
        weekday_limit = config.rate_limits.weekday_limit,
        weekend_limit = config.rate_limits.weekend_limit,
        cache_expiry_seconds = config.cache.expiry_seconds,
        "Gateway running"
    );

    axum::serve(listener, http::router(Arc::new(gateway)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
