use std::sync::Arc;

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use reviewsense_core::{AnalysisService, MemoryStore};
use reviewsense_server::celery::CeleryDispatcher;
use reviewsense_server::config::Config;
use reviewsense_server::routes::api_router;
use reviewsense_server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Starting reviewsense server");

    let config = Config::from_env().context("failed to load configuration")?;

    info!(
        "Connecting to Redis at {}:{} ({})",
        config.redis_host,
        config.redis_port,
        if config.redis_password.is_some() {
            "with password"
        } else {
            "no password"
        }
    );
    let client =
        redis::Client::open(config.redis_url()).context("invalid Redis connection URL")?;
    let conn = ConnectionManager::new(client)
        .await
        .context("failed to connect to Redis")?;

    let dispatcher = Arc::new(CeleryDispatcher::new(conn, config.worker_task.clone()));
    let store = Arc::new(MemoryStore::new());
    let service = Arc::new(AnalysisService::new(store, dispatcher));
    let state = Arc::new(AppState { service });

    let app = api_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
