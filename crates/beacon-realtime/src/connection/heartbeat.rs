//! Server-driven ping/pong heartbeat with a miss counter.

use std::sync::Arc;

use tokio::time::interval;
use tracing::{debug, warn};

use beacon_core::config::realtime::RealtimeConfig;

use super::handle::{ClientHandle, OutboundFrame};

/// Runs the heartbeat loop for a single connection.
///
/// Every tick sends a native ping and increments the handle's miss counter;
/// a pong (handled by the fleet) resets it. Once the counter reaches the
/// configured limit the connection is closed.
pub struct HeartbeatMonitor {
    /// Ping cadence and miss budget.
    config: RealtimeConfig,
}

impl HeartbeatMonitor {
    /// Creates a new heartbeat monitor from configuration.
    pub fn new(config: &RealtimeConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Runs the heartbeat loop for a connection.
    ///
    /// Returns when the connection is considered dead or closed.
    pub async fn run(&self, handle: Arc<ClientHandle>) {
        let mut ticker = interval(self.config.ping_interval());
        // Skip the immediate first tick; a fresh connection needs no ping.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            if !handle.is_alive() {
                debug!(conn_id = %handle.id, "Connection closed, stopping heartbeat");
                return;
            }

            if handle.ping_misses() >= self.config.max_ping_misses {
                warn!(
                    conn_id = %handle.id,
                    misses = handle.ping_misses(),
                    "Heartbeat miss budget exhausted, closing connection"
                );
                // Close goes out before the handle flips dead, or it would
                // be refused by the liveness check.
                let _ = handle.send(OutboundFrame::Close).await;
                handle.mark_closed();
                return;
            }

            if let Err(e) = handle.send(OutboundFrame::Ping).await {
                warn!(
                    conn_id = %handle.id,
                    error = %e,
                    "Failed to send ping, marking connection as dead"
                );
                handle.mark_closed();
                return;
            }
            handle.record_ping();

            debug!(conn_id = %handle.id, misses = handle.ping_misses(), "Ping sent");
        }
    }
}
