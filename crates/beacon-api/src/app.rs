//! Application bootstrap: state construction and the server run loop.

use std::sync::Arc;

use tracing::info;

use beacon_cache::provider::CacheManager;
use beacon_core::config::AppConfig;
use beacon_core::error::AppError;
use beacon_presence::disconnect::DisconnectResolver;
use beacon_presence::service::PresenceService;
use beacon_presence::store::PresenceStore;
use beacon_realtime::server::RealtimeEngine;

use crate::middleware::rate_limit::RateLimiter;
use crate::router::build_router;
use crate::state::AppState;

/// Wires the cache, store, service, and realtime engine into `AppState`.
pub async fn build_state(config: AppConfig) -> Result<AppState, AppError> {
    config.presence.validate()?;

    let cache = Arc::new(CacheManager::new(&config.cache).await?);
    let store = Arc::new(PresenceStore::new(
        Arc::clone(&cache),
        config.presence.clone(),
    ));
    let resolver = Arc::new(DisconnectResolver::new(
        Arc::clone(&store),
        config.realtime.clone(),
    ));
    let service = Arc::new(PresenceService::new(Arc::clone(&store), resolver));
    let realtime = RealtimeEngine::new(
        config.realtime.clone(),
        Arc::clone(&store),
        Arc::clone(&service),
    );

    Ok(AppState {
        config: Arc::new(config),
        cache,
        store,
        service,
        realtime,
        rate_limiter: Arc::new(RateLimiter::new()),
    })
}

/// Runs the HTTP server until ctrl-c.
pub async fn run_server(config: AppConfig) -> Result<(), AppError> {
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let state = build_state(config).await?;
    state.realtime.start();

    let realtime = state.realtime.clone();
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;

    info!(addr = %addr, "Beacon server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            let _ = realtime.shutdown().await;
        })
        .await
        .map_err(|e| AppError::internal(format!("Server error: {e}")))?;

    Ok(())
}
