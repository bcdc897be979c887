//! Wire message definitions shared by the server and the agent.

use serde::{Deserialize, Serialize};

use super::device::DeviceClass;
use super::mode::SessionMode;

/// JSON messages sent by the agent over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// First message after open; binds the socket to a session.
    Auth {
        /// Tenant identifier.
        #[serde(rename = "customerId")]
        customer_id: String,
        /// Session identifier.
        #[serde(rename = "sessionId")]
        session_id: String,
        /// Tab identifier.
        #[serde(rename = "tabId")]
        tab_id: String,
    },
    /// Application-level ping, separate from native frames.
    Ping {
        /// Client timestamp in epoch milliseconds.
        timestamp: i64,
    },
    /// Leader-driven record TTL extension.
    TtlRefresh {
        /// Tenant identifier.
        #[serde(rename = "customerId")]
        customer_id: String,
        /// Session identifier.
        #[serde(rename = "sessionId")]
        session_id: String,
        /// Tab identifier.
        #[serde(rename = "tabId")]
        tab_id: String,
        /// Client timestamp in epoch milliseconds.
        timestamp: i64,
        /// New session mode, when it changed since the last refresh.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_mode: Option<SessionMode>,
    },
}

/// JSON messages sent by the server over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Auth acknowledgement.
    Hello {
        /// Server timestamp in epoch milliseconds.
        timestamp: i64,
        /// Echoed session identifier.
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    /// Smoothed live-count fan-out.
    #[serde(rename = "metrics:update")]
    MetricsUpdate {
        /// Sampled metrics.
        data: MetricsPayload,
    },
    /// Application-level pong.
    Pong {
        /// Server timestamp in epoch milliseconds.
        timestamp: i64,
    },
    /// Error surfaced to the client.
    Error {
        /// Human-readable description.
        message: String,
        /// Optional machine-readable code.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

/// One live-count sample for a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsPayload {
    /// Tenant identifier.
    #[serde(rename = "customerId")]
    pub customer_id: String,
    /// Sample timestamp in epoch milliseconds.
    pub timestamp: i64,
    /// Raw active session count.
    pub count: u64,
    /// Exponentially smoothed count.
    pub ema: f64,
}

/// Body of `POST /presence/join`.
///
/// Identifier fields are optional at the parse layer so the handler can
/// produce the documented 400 instead of a generic deserialization error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Tenant identifier.
    #[serde(rename = "customerId")]
    pub customer_id: Option<String>,
    /// Session identifier.
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    /// Tab identifier.
    #[serde(rename = "tabId")]
    pub tab_id: Option<String>,
    /// Client timestamp in epoch milliseconds.
    pub timestamp: Option<i64>,
    /// Operating system tag.
    pub platform: Option<String>,
    /// Browser tag.
    pub browser: Option<String>,
    /// Device class tag.
    pub device: Option<DeviceClass>,
    /// Raw user agent.
    #[serde(rename = "userAgent")]
    pub user_agent: Option<String>,
    /// Desktop-site toggle on a handheld browser.
    pub desktop_mode: Option<bool>,
    /// Tabs known to the session.
    pub total_tab_quantity: Option<u32>,
    /// Backgrounded tabs among the total.
    #[serde(rename = "total_backgroundTab_quantity")]
    pub total_background_tab_quantity: Option<u32>,
    /// Session mode at send time.
    pub session_mode: Option<SessionMode>,
}

impl JoinRequest {
    /// The three required identifiers, when all are present and non-empty.
    pub fn ids(&self) -> Option<(&str, &str, &str)> {
        match (&self.customer_id, &self.session_id, &self.tab_id) {
            (Some(c), Some(s), Some(t)) if !c.is_empty() && !s.is_empty() && !t.is_empty() => {
                Some((c, s, t))
            }
            _ => None,
        }
    }
}

/// How certain the unload classifier was about a LEAVE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaveMode {
    /// The classifier confirmed the session is gone.
    Final,
    /// Intent was unknown at the decision point.
    Pending,
}

/// Why the LEAVE was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaveReason {
    /// Confirmed navigation to a foreign origin.
    External,
    /// Tab close.
    Tabclose,
    /// No intent signal was captured.
    Unknown,
}

/// Body of `POST /presence/leave`, also accepted as a `text/plain` beacon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaveRequest {
    /// Tenant identifier.
    #[serde(rename = "customerId")]
    pub customer_id: Option<String>,
    /// Session identifier.
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    /// Tab identifier.
    #[serde(rename = "tabId")]
    pub tab_id: Option<String>,
    /// Client timestamp in epoch milliseconds.
    pub timestamp: Option<i64>,
    /// FINAL vs PENDING.
    pub mode: Option<LeaveMode>,
    /// Classifier reason.
    pub reason: Option<LeaveReason>,
}

impl LeaveRequest {
    /// The customer and session identifiers, when both are present.
    pub fn ids(&self) -> Option<(&str, &str)> {
        match (&self.customer_id, &self.session_id) {
            (Some(c), Some(s)) if !c.is_empty() && !s.is_empty() => Some((c, s)),
            _ => None,
        }
    }
}
