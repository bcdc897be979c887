//! JOIN and LEAVE handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::debug;

use beacon_core::types::wire::{JoinRequest, LeaveRequest};
use beacon_presence::service::LeaveOutcome;

use crate::state::AppState;

/// `POST /presence/join`
pub async fn join(State(state): State<AppState>, Json(payload): Json<JoinRequest>) -> Response {
    let Some((customer_id, _, _)) = payload.ids() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Missing required fields"})),
        )
            .into_response();
    };
    let customer_id = customer_id.to_string();

    match state.service.join(&payload).await {
        Ok(_) => {
            // Presence for this customer is live; keep it sampled.
            state.realtime.ema.subscribe(&customer_id);
            (StatusCode::OK, Json(json!({"success": true}))).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// `POST /presence/beat` — legacy heartbeat.
///
/// Current clients refresh TTLs over the socket or through polling JOINs;
/// this stays for agents that predate both.
pub async fn beat(State(state): State<AppState>, Json(payload): Json<JoinRequest>) -> Response {
    if payload.ids().is_none() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Missing required fields"})),
        )
            .into_response();
    }

    match state.service.beat(&payload).await {
        Ok(()) => (StatusCode::OK, Json(json!({"success": true}))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// `POST /presence/leave`
///
/// Dismissal-safe by contract: unload-time beacons cannot retry, so parse
/// failures and duplicates all collapse to an empty 204 rather than an
/// error the sender will never see.
pub async fn leave(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let leave_id = headers
        .get("x-leave-id")
        .and_then(|value| value.to_str().ok());

    // The body may arrive as application/json or as a text/plain beacon;
    // both carry the same JSON.
    let payload: LeaveRequest = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            debug!(error = %e, "Unparseable LEAVE body dismissed");
            return StatusCode::NO_CONTENT.into_response();
        }
    };

    match state.service.leave(&payload, leave_id).await {
        Ok(LeaveOutcome::Processed) => {
            (StatusCode::OK, Json(json!({"success": true}))).into_response()
        }
        Ok(LeaveOutcome::Duplicate) | Ok(LeaveOutcome::Dismissed) => {
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            debug!(error = %e, "LEAVE failed, dismissing");
            StatusCode::NO_CONTENT.into_response()
        }
    }
}
