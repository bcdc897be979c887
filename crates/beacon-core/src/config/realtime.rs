//! Real-time WebSocket fleet configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Real-time (WebSocket) fleet configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Server-driven ping interval in seconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_seconds: u64,
    /// Number of unanswered pings before a connection is closed.
    #[serde(default = "default_max_ping_misses")]
    pub max_ping_misses: u32,
    /// Internal channel buffer size for per-connection outbound queues.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer_size: usize,
    /// Grace window after a handheld disconnect before the verify timer starts,
    /// in milliseconds.
    #[serde(default = "default_disconnect_grace_ms")]
    pub disconnect_grace_ms: u64,
    /// Delay before the disconnect resolver inspects the record, in seconds.
    #[serde(default = "default_disconnect_verify_delay")]
    pub disconnect_verify_delay_seconds: u64,
    /// Remaining-TTL floor above which a disconnected session is considered
    /// reconnected, in seconds.
    #[serde(default = "default_reconnect_ttl_floor")]
    pub reconnect_ttl_floor_seconds: i64,
}

impl RealtimeConfig {
    /// Interval between server-driven pings.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_seconds)
    }

    /// Grace window before disconnect verification.
    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_millis(self.disconnect_grace_ms)
    }

    /// Delay before the disconnect resolver inspects the record.
    pub fn disconnect_verify_delay(&self) -> Duration {
        Duration::from_secs(self.disconnect_verify_delay_seconds)
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            ping_interval_seconds: default_ping_interval(),
            max_ping_misses: default_max_ping_misses(),
            channel_buffer_size: default_channel_buffer(),
            disconnect_grace_ms: default_disconnect_grace_ms(),
            disconnect_verify_delay_seconds: default_disconnect_verify_delay(),
            reconnect_ttl_floor_seconds: default_reconnect_ttl_floor(),
        }
    }
}

fn default_ping_interval() -> u64 {
    25
}

fn default_max_ping_misses() -> u32 {
    2
}

fn default_channel_buffer() -> usize {
    256
}

fn default_disconnect_grace_ms() -> u64 {
    500
}

fn default_disconnect_verify_delay() -> u64 {
    10
}

fn default_reconnect_ttl_floor() -> i64 {
    15
}
