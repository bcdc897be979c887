//! Application state shared across all handlers and middleware.

use std::sync::Arc;

use beacon_cache::provider::CacheManager;
use beacon_core::config::AppConfig;
use beacon_presence::service::PresenceService;
use beacon_presence::store::PresenceStore;
use beacon_realtime::server::RealtimeEngine;

use crate::middleware::rate_limit::RateLimiter;

/// Application state containing all shared dependencies.
///
/// Passed to every Axum handler via `State<AppState>`.
/// All fields are `Arc`-wrapped for cheap cloning across tasks.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Cache manager (Redis or in-memory).
    pub cache: Arc<CacheManager>,
    /// Presence record store.
    pub store: Arc<PresenceStore>,
    /// Presence service (JOIN / LEAVE / TTL refresh).
    pub service: Arc<PresenceService>,
    /// WebSocket realtime engine.
    pub realtime: RealtimeEngine,
    /// Request rate limiter.
    pub rate_limiter: Arc<RateLimiter>,
}
