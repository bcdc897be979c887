//! Individual WebSocket connection handle — send, bind, close.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use beacon_core::types::device::DeviceClass;

/// Unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Creates a new random connection ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outbound traffic to one socket, mapped to real frames by the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// A JSON text frame.
    Text(String),
    /// A native ping frame.
    Ping,
    /// Close the socket.
    Close,
}

/// The session a connection authenticated as.
#[derive(Debug, Clone)]
pub struct SessionBinding {
    /// Tenant identifier.
    pub customer_id: String,
    /// Session identifier.
    pub session_id: String,
    /// Tab identifier.
    pub tab_id: String,
    /// Device class from the presence record.
    pub device: DeviceClass,
    /// Platform tag from the presence record.
    pub platform: Option<String>,
}

/// Represents a single WebSocket connection.
///
/// Connections start unbound; the first `auth` message attaches a
/// [`SessionBinding`].
#[derive(Debug)]
pub struct ClientHandle {
    /// Unique connection identifier.
    pub id: ConnectionId,
    /// Channel for sending frames to this connection.
    pub tx: mpsc::Sender<OutboundFrame>,
    /// When the connection was established.
    pub connected_at: DateTime<Utc>,
    /// Session identity, set on `auth`.
    binding: RwLock<Option<SessionBinding>>,
    /// Pings sent since the last pong.
    ping_misses: AtomicU32,
    /// Whether the connection is still alive.
    alive: AtomicBool,
}

impl ClientHandle {
    /// Creates a new, unbound connection handle.
    pub fn new(tx: mpsc::Sender<OutboundFrame>) -> Self {
        Self {
            id: ConnectionId::new(),
            tx,
            connected_at: Utc::now(),
            binding: RwLock::new(None),
            ping_misses: AtomicU32::new(0),
            alive: AtomicBool::new(true),
        }
    }

    /// Sends a frame to this connection.
    pub async fn send(&self, frame: OutboundFrame) -> Result<(), String> {
        if !self.is_alive() {
            return Err("Connection is closed".to_string());
        }
        self.tx
            .send(frame)
            .await
            .map_err(|e| format!("Send failed: {e}"))
    }

    /// Sends a JSON text frame.
    pub async fn send_text(&self, text: String) -> Result<(), String> {
        self.send(OutboundFrame::Text(text)).await
    }

    /// Attaches the session identity after a successful `auth`.
    pub fn bind(&self, binding: SessionBinding) {
        *self.binding.write() = Some(binding);
    }

    /// The session identity, if the connection has authenticated.
    pub fn binding(&self) -> Option<SessionBinding> {
        self.binding.read().clone()
    }

    /// Checks whether the connection is still alive.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// Marks the connection as closed.
    pub fn mark_closed(&self) {
        self.alive.store(false, Ordering::Relaxed);
    }

    /// Records a sent ping; returns the number of unanswered pings so far.
    pub fn record_ping(&self) -> u32 {
        self.ping_misses.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Unanswered pings since the last pong.
    pub fn ping_misses(&self) -> u32 {
        self.ping_misses.load(Ordering::Relaxed)
    }

    /// Resets the miss counter (a pong arrived).
    pub fn record_pong(&self) {
        self.ping_misses.store(0, Ordering::Relaxed);
    }
}
