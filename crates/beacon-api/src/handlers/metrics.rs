//! Polling-mode metrics endpoint.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use beacon_core::types::wire::MetricsPayload;

use crate::state::AppState;

/// Query parameters for the metrics endpoint.
#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    /// Tenant identifier.
    #[serde(rename = "customerId")]
    pub customer_id: Option<String>,
}

/// `GET /active-users/metrics?customerId=…`
pub async fn metrics(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> Response {
    let Some(customer_id) = query.customer_id.filter(|id| !id.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Missing customerId"})),
        )
            .into_response();
    };

    // Polling customers get sampled too, not just socket customers.
    state.realtime.ema.subscribe(&customer_id);

    let count = match state.store.get_active_count(&customer_id).await {
        Ok(count) => count,
        Err(e) => return e.into_response(),
    };
    let ema = match state.store.get_ema(&customer_id).await {
        Ok(ema) => ema.unwrap_or(count as f64),
        Err(e) => return e.into_response(),
    };

    Json(MetricsPayload {
        customer_id,
        timestamp: Utc::now().timestamp_millis(),
        count,
        ema,
    })
    .into_response()
}
