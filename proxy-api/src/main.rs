use anyhow::{Context, Result};
use proxy_api::{create_app, AppState, Config};
use proxy_orchestrator::db::{backup_database, create_pool, run_migrations};
use proxy_orchestrator::{StorageApiClient, UnconfiguredQueryEngine};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();

    // RUST_LOG wins over LOG_LEVEL when both are set
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting proxy-api service...");
    info!(
        "Configuration loaded: bind_addr={}, db_path={}, storage_api_host={}",
        config.bind_addr,
        config.db_path.display(),
        config.storage_api_host
    );

    // Database setup
    let db_path = &config.db_path;
    if let Some(backup_path) = backup_database(db_path)? {
        info!("Database backed up to: {}", backup_path.display());
    }

    let pool = create_pool(db_path).await?;
    info!("Running database migrations...");
    run_migrations(&pool).await?;
    info!("Migrations complete");

    let provisioning = StorageApiClient::new(&config.storage_api_host, config.request_timeout())
        .context("Failed to build Storage API client")?;

    warn!("No query engine configured; /query requests will fail with 502");
    let state = AppState::new(
        pool.clone(),
        Arc::new(provisioning),
        Arc::new(UnconfiguredQueryEngine),
        config.lock_timeout(),
        config.request_timeout(),
    );

    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down, closing credential cache");
    pool.close().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
