//! Health check endpoint.

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use beacon_core::traits::cache::CacheProvider;

use crate::state::AppState;

/// `GET /health`
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let cache_ok = state.cache.health_check().await.unwrap_or(false);
    Json(json!({
        "status": if cache_ok { "ok" } else { "degraded" },
        "cache": cache_ok,
        "connections": state.realtime.fleet.connection_count(),
    }))
}
