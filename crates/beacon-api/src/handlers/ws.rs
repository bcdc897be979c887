//! WebSocket upgrade handler.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use beacon_realtime::connection::handle::OutboundFrame;
use beacon_realtime::connection::heartbeat::HeartbeatMonitor;

use crate::state::AppState;

/// `GET /ws/active-users` — WebSocket upgrade.
///
/// Authentication happens in-band: the first client message must be `auth`.
pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

/// Handles an established WebSocket connection.
async fn handle_socket(state: AppState, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let fleet = state.realtime.fleet.clone();
    let (handle, mut rx) = fleet.connect();
    let conn_id = handle.id;

    info!(conn_id = %conn_id, "WebSocket connection established");

    // Outbound pump: frames from the fleet onto the socket.
    let outbound_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let message = match frame {
                OutboundFrame::Text(text) => Message::Text(text),
                OutboundFrame::Ping => Message::Ping(Vec::new()),
                OutboundFrame::Close => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            };
            if ws_tx.send(message).await.is_err() {
                break;
            }
        }
    });

    // Server-driven heartbeat with the miss counter.
    let heartbeat_task = tokio::spawn({
        let monitor = HeartbeatMonitor::new(fleet.config());
        let handle = handle.clone();
        async move {
            monitor.run(handle).await;
        }
    });

    // Inbound loop.
    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if let Some(customer_id) = fleet.handle_inbound(&conn_id, &text).await {
                    state.realtime.ema.subscribe(&customer_id);
                }
            }
            Ok(Message::Pong(_)) => {
                fleet.handle_pong(&conn_id);
            }
            Ok(Message::Close(_)) => {
                debug!(conn_id = %conn_id, "Client closed the socket");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Cleanup; unregistering applies the platform-aware disconnect policy.
    outbound_task.abort();
    heartbeat_task.abort();
    fleet.disconnect(&conn_id);

    info!(conn_id = %conn_id, "WebSocket connection closed");
}
