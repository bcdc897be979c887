//! Fleet manager — connection lifecycle and inbound message routing.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use beacon_core::config::realtime::RealtimeConfig;
use beacon_core::types::wire::{ClientMessage, MetricsPayload, ServerMessage};
use beacon_presence::ema::MetricsSink;
use beacon_presence::service::PresenceService;
use beacon_presence::store::PresenceStore;

use super::handle::{ClientHandle, ConnectionId, OutboundFrame, SessionBinding};
use super::pool::ClientPool;

/// Manages all active WebSocket connections for the presence surface.
#[derive(Debug)]
pub struct ClientFleet {
    /// Connection pool.
    pool: Arc<ClientPool>,
    /// Presence store, for device/platform lookup at auth time.
    store: Arc<PresenceStore>,
    /// Presence service, for TTL refresh and disconnect policy.
    service: Arc<PresenceService>,
    /// Configuration.
    config: RealtimeConfig,
}

impl ClientFleet {
    /// Creates a new fleet.
    pub fn new(
        config: RealtimeConfig,
        store: Arc<PresenceStore>,
        service: Arc<PresenceService>,
    ) -> Self {
        Self {
            pool: Arc::new(ClientPool::new()),
            store,
            service,
            config,
        }
    }

    /// Registers a fresh, not-yet-authenticated connection.
    ///
    /// Returns the handle and the receiver side of its outbound frame queue.
    pub fn connect(&self) -> (Arc<ClientHandle>, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(self.config.channel_buffer_size);
        let handle = Arc::new(ClientHandle::new(tx));
        self.pool.add(handle.clone());

        debug!(conn_id = %handle.id, "WebSocket connection opened");
        (handle, rx)
    }

    /// Removes a connection and applies the platform-aware disconnect policy.
    pub fn disconnect(&self, conn_id: &ConnectionId) {
        let Some(handle) = self.pool.remove(conn_id) else {
            return;
        };
        handle.mark_closed();

        if let Some(binding) = handle.binding() {
            self.service
                .handle_disconnect(&binding.customer_id, &binding.session_id, binding.device);
            info!(
                conn_id = %conn_id,
                customer_id = %binding.customer_id,
                session_id = %binding.session_id,
                device = %binding.device,
                "WebSocket connection closed"
            );
        } else {
            debug!(conn_id = %conn_id, "Unauthenticated connection closed");
        }
    }

    /// Processes an inbound text message from a client.
    ///
    /// Returns the customer id when the message was a successful `auth`, so
    /// the caller can hook the customer into the EMA sampler.
    pub async fn handle_inbound(&self, conn_id: &ConnectionId, raw_message: &str) -> Option<String> {
        let handle = match self.pool.get(conn_id) {
            Some(h) => h,
            None => {
                warn!(conn_id = %conn_id, "Message from unknown connection");
                return None;
            }
        };

        let msg: ClientMessage = match serde_json::from_str(raw_message) {
            Ok(m) => m,
            Err(e) => {
                let error = ServerMessage::Error {
                    message: format!("Failed to parse message: {e}"),
                    code: Some("INVALID_MESSAGE".to_string()),
                };
                self.send_message(&handle, &error).await;
                return None;
            }
        };

        match msg {
            ClientMessage::Auth {
                customer_id,
                session_id,
                tab_id,
            } => {
                self.handle_auth(&handle, customer_id, session_id, tab_id)
                    .await
            }
            ClientMessage::TtlRefresh {
                customer_id,
                session_id,
                session_mode,
                ..
            } => {
                if let Err(e) = self
                    .service
                    .refresh_ttl(&customer_id, &session_id, session_mode)
                    .await
                {
                    warn!(
                        conn_id = %conn_id,
                        customer_id = %customer_id,
                        error = %e,
                        "TTL refresh failed"
                    );
                }
                None
            }
            ClientMessage::Ping { .. } => {
                let pong = ServerMessage::Pong {
                    timestamp: Utc::now().timestamp_millis(),
                };
                self.send_message(&handle, &pong).await;
                None
            }
        }
    }

    /// Binds a connection to a session and acknowledges with `hello`.
    async fn handle_auth(
        &self,
        handle: &Arc<ClientHandle>,
        customer_id: String,
        session_id: String,
        tab_id: String,
    ) -> Option<String> {
        // Device and platform come from the presence record the leader wrote;
        // the socket cannot be trusted to classify itself.
        let record = match self.store.get(&customer_id, &session_id).await {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    conn_id = %handle.id,
                    customer_id = %customer_id,
                    error = %e,
                    "Auth record lookup failed"
                );
                None
            }
        };

        let binding = SessionBinding {
            customer_id: customer_id.clone(),
            session_id: session_id.clone(),
            tab_id,
            device: record.as_ref().map(|r| r.device).unwrap_or_default(),
            platform: record.and_then(|r| r.platform),
        };

        self.service.cancel_disconnect(&customer_id, &session_id);
        self.pool.bind(&handle.id, binding);

        let hello = ServerMessage::Hello {
            timestamp: Utc::now().timestamp_millis(),
            session_id: session_id.clone(),
        };
        self.send_message(handle, &hello).await;

        info!(
            conn_id = %handle.id,
            customer_id = %customer_id,
            session_id = %session_id,
            "WebSocket connection authenticated"
        );
        Some(customer_id)
    }

    /// Resets the miss counter when a native pong arrives.
    pub fn handle_pong(&self, conn_id: &ConnectionId) {
        if let Some(handle) = self.pool.get(conn_id) {
            handle.record_pong();
        }
    }

    /// Serializes and sends a server message to one connection.
    async fn send_message(&self, handle: &Arc<ClientHandle>, message: &ServerMessage) {
        match serde_json::to_string(message) {
            Ok(text) => {
                if let Err(e) = handle.send_text(text).await {
                    warn!(conn_id = %handle.id, error = %e, "Failed to send message");
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to serialize server message");
            }
        }
    }

    /// Closes all connections (graceful shutdown).
    pub async fn close_all(&self) {
        let all = self.pool.all_connections();
        for handle in &all {
            let _ = handle.send(OutboundFrame::Close).await;
            handle.mark_closed();
            self.pool.remove(&handle.id);
        }
        if !all.is_empty() {
            info!(count = all.len(), "All connections closed");
        }
    }

    /// Total open connections.
    pub fn connection_count(&self) -> usize {
        self.pool.connection_count()
    }

    /// Whether a customer currently has any authenticated socket.
    pub fn has_customer(&self, customer_id: &str) -> bool {
        self.pool.has_customer(customer_id)
    }

    /// Heartbeat configuration for per-connection monitors.
    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }
}

#[async_trait]
impl MetricsSink for ClientFleet {
    async fn broadcast_metrics(&self, payload: &MetricsPayload) {
        let message = ServerMessage::MetricsUpdate {
            data: payload.clone(),
        };
        let text = match serde_json::to_string(&message) {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "Failed to serialize metrics update");
                return;
            }
        };

        // Snapshot before sending: membership may change mid-broadcast.
        let handles = self.pool.customer_handles(&payload.customer_id);
        let mut sent = 0usize;
        for handle in &handles {
            if handle.is_alive() && handle.send_text(text.clone()).await.is_ok() {
                sent += 1;
            }
        }

        debug!(
            customer_id = %payload.customer_id,
            count = payload.count,
            ema = payload.ema,
            clients = sent,
            "Metrics broadcast"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use beacon_cache::provider::CacheManager;
    use beacon_core::config::presence::PresenceConfig;
    use beacon_core::types::wire::JoinRequest;
    use beacon_presence::disconnect::DisconnectResolver;

    fn make_fleet() -> (Arc<ClientFleet>, Arc<PresenceService>) {
        let cache = Arc::new(CacheManager::from_provider(Arc::new(
            beacon_cache::memory::MemoryCacheProvider::default(),
        )));
        let store = Arc::new(PresenceStore::new(cache, PresenceConfig::default()));
        let resolver = Arc::new(DisconnectResolver::new(
            Arc::clone(&store),
            RealtimeConfig::default(),
        ));
        let service = Arc::new(PresenceService::new(Arc::clone(&store), resolver));
        let fleet = Arc::new(ClientFleet::new(
            RealtimeConfig::default(),
            store,
            Arc::clone(&service),
        ));
        (fleet, service)
    }

    async fn join(service: &PresenceService, customer: &str, session: &str) {
        let join = JoinRequest {
            customer_id: Some(customer.to_string()),
            session_id: Some(session.to_string()),
            tab_id: Some("t1".to_string()),
            ..Default::default()
        };
        service.join(&join).await.unwrap();
    }

    fn frame_json(frame: OutboundFrame) -> serde_json::Value {
        match frame {
            OutboundFrame::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn auth_binds_and_replies_hello() {
        let (fleet, service) = make_fleet();
        join(&service, "acme", "s1").await;

        let (handle, mut rx) = fleet.connect();
        let authed = fleet
            .handle_inbound(
                &handle.id,
                r#"{"type":"auth","customerId":"acme","sessionId":"s1","tabId":"t1"}"#,
            )
            .await;
        assert_eq!(authed.as_deref(), Some("acme"));
        assert!(fleet.has_customer("acme"));

        let hello = frame_json(rx.recv().await.unwrap());
        assert_eq!(hello.get("type").unwrap(), "hello");
        assert_eq!(hello.get("sessionId").unwrap(), "s1");
    }

    #[tokio::test]
    async fn json_ping_gets_json_pong() {
        let (fleet, _) = make_fleet();
        let (handle, mut rx) = fleet.connect();

        fleet
            .handle_inbound(&handle.id, r#"{"type":"ping","timestamp":1}"#)
            .await;
        let pong = frame_json(rx.recv().await.unwrap());
        assert_eq!(pong.get("type").unwrap(), "pong");
    }

    #[tokio::test]
    async fn malformed_message_gets_error() {
        let (fleet, _) = make_fleet();
        let (handle, mut rx) = fleet.connect();

        fleet.handle_inbound(&handle.id, "not json").await;
        let error = frame_json(rx.recv().await.unwrap());
        assert_eq!(error.get("type").unwrap(), "error");
        assert_eq!(error.get("code").unwrap(), "INVALID_MESSAGE");
    }

    #[tokio::test]
    async fn ttl_refresh_extends_the_record() {
        let (fleet, service) = make_fleet();
        join(&service, "acme", "s1").await;

        let (handle, _rx) = fleet.connect();
        fleet
            .handle_inbound(
                &handle.id,
                r#"{"type":"ttl_refresh","customerId":"acme","sessionId":"s1","tabId":"t1","timestamp":1,"session_mode":"passive_active"}"#,
            )
            .await;

        let stored = service.store().get("acme", "s1").await.unwrap().unwrap();
        assert!(stored.session_mode.is_passive());
        assert_eq!(service.store().get_key_ttl("acme", "s1").await.unwrap(), 300);
    }

    #[tokio::test]
    async fn metrics_broadcast_reaches_only_that_customer() {
        let (fleet, service) = make_fleet();
        join(&service, "acme", "s1").await;
        join(&service, "globex", "s2").await;

        let (acme, mut acme_rx) = fleet.connect();
        fleet
            .handle_inbound(
                &acme.id,
                r#"{"type":"auth","customerId":"acme","sessionId":"s1","tabId":"t1"}"#,
            )
            .await;
        let (globex, mut globex_rx) = fleet.connect();
        fleet
            .handle_inbound(
                &globex.id,
                r#"{"type":"auth","customerId":"globex","sessionId":"s2","tabId":"t1"}"#,
            )
            .await;
        // Drain the hello frames.
        acme_rx.recv().await.unwrap();
        globex_rx.recv().await.unwrap();

        fleet
            .broadcast_metrics(&MetricsPayload {
                customer_id: "acme".to_string(),
                timestamp: 1,
                count: 3,
                ema: 2.5,
            })
            .await;

        let update = frame_json(acme_rx.recv().await.unwrap());
        assert_eq!(update.get("type").unwrap(), "metrics:update");
        assert_eq!(update.pointer("/data/count").unwrap(), 3);
        assert!(globex_rx.try_recv().is_err());
    }
}
