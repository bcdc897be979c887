//! Browser agent configuration.
//!
//! These knobs are served to the embedded agent and drive tab coordination,
//! the session-mode state machine, and transport selection.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Browser agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Whether the WebSocket transport is enabled at all.
    #[serde(default = "default_true")]
    pub websocket_enabled: bool,
    /// Polling interval while active in background, in seconds.
    #[serde(default = "default_polling_interval")]
    pub polling_interval_seconds: u64,
    /// Polling interval while passive, in seconds.
    #[serde(default = "default_polling_interval_passive")]
    pub polling_interval_passive_seconds: u64,
    /// TTL refresh cadence over the WebSocket, in seconds.
    #[serde(default = "default_ttl_refresh_interval")]
    pub ttl_refresh_interval_seconds: u64,
    /// TTL refresh cadence while passive, in seconds.
    #[serde(default = "default_ttl_refresh_interval_passive")]
    pub ttl_refresh_interval_passive_seconds: u64,
    /// Debounce applied to visibility transitions, in milliseconds.
    #[serde(default = "default_visibility_debounce_ms")]
    pub visibility_debounce_ms: u64,
    /// Candidate collection window for leader elections, in milliseconds.
    #[serde(default = "default_election_window_ms")]
    pub election_window_ms: u64,
    /// Delay before the foreground fast-path election, in milliseconds.
    #[serde(default = "default_fast_election_delay_ms")]
    pub fast_election_delay_ms: u64,
    /// Leader heartbeat interval, in seconds. Must stay under the beat
    /// timeout or followers re-elect between beats; 10 s is the hard cap.
    #[serde(default = "default_leader_beat_interval")]
    pub leader_beat_interval_seconds: u64,
    /// Silence after which the leader is presumed gone, in seconds.
    #[serde(default = "default_leader_beat_timeout")]
    pub leader_beat_timeout_seconds: u64,
    /// Peer entries unseen for this long are pruned, in seconds.
    #[serde(default = "default_peer_ttl")]
    pub peer_ttl_seconds: u64,
    /// Minimum spacing between JOIN requests, in milliseconds.
    #[serde(default = "default_join_cooldown_ms")]
    pub join_cooldown_ms: u64,
    /// Settle delay when switching between transports, in milliseconds.
    #[serde(default = "default_switch_settle_ms")]
    pub switch_settle_ms: u64,
    /// Foreground idle time before `active` decays to `passive_active`, in seconds.
    #[serde(default = "default_idle_to_passive")]
    pub idle_to_passive_seconds: u64,
    /// Passive idle time before the session is removed, in seconds.
    #[serde(default = "default_passive_to_removed")]
    pub passive_to_removed_seconds: u64,
    /// Idle window within which the persisted session identity is reused, in hours.
    #[serde(default = "default_session_idle_window")]
    pub session_idle_window_hours: u64,
    /// Maximum WebSocket reconnect attempts before falling back to polling.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Base reconnect backoff delay, in milliseconds.
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    /// Reconnect backoff ceiling, in milliseconds.
    #[serde(default = "default_reconnect_cap_ms")]
    pub reconnect_cap_ms: u64,
    /// Origins treated as internal by the unload classifier.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl AgentConfig {
    /// Polling interval for the given passivity.
    pub fn polling_interval(&self, passive: bool) -> Duration {
        if passive {
            Duration::from_secs(self.polling_interval_passive_seconds)
        } else {
            Duration::from_secs(self.polling_interval_seconds)
        }
    }

    /// TTL refresh cadence for the given passivity.
    pub fn ttl_refresh_interval(&self, passive: bool) -> Duration {
        if passive {
            Duration::from_secs(self.ttl_refresh_interval_passive_seconds)
        } else {
            Duration::from_secs(self.ttl_refresh_interval_seconds)
        }
    }

    /// Debounce applied to visibility transitions.
    pub fn visibility_debounce(&self) -> Duration {
        Duration::from_millis(self.visibility_debounce_ms)
    }

    /// Candidate collection window for elections.
    pub fn election_window(&self) -> Duration {
        Duration::from_millis(self.election_window_ms)
    }

    /// Leader heartbeat interval.
    pub fn leader_beat_interval(&self) -> Duration {
        Duration::from_secs(self.leader_beat_interval_seconds)
    }

    /// Silence after which the leader is presumed gone.
    pub fn leader_beat_timeout(&self) -> Duration {
        Duration::from_secs(self.leader_beat_timeout_seconds)
    }

    /// Peer staleness cutoff.
    pub fn peer_ttl(&self) -> Duration {
        Duration::from_secs(self.peer_ttl_seconds)
    }

    /// Foreground idle budget (F).
    pub fn idle_to_passive(&self) -> Duration {
        Duration::from_secs(self.idle_to_passive_seconds)
    }

    /// Passive idle budget (P).
    pub fn passive_to_removed(&self) -> Duration {
        Duration::from_secs(self.passive_to_removed_seconds)
    }

    /// Session identity idle window.
    pub fn session_idle_window(&self) -> Duration {
        Duration::from_secs(self.session_idle_window_hours * 3600)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            websocket_enabled: true,
            polling_interval_seconds: default_polling_interval(),
            polling_interval_passive_seconds: default_polling_interval_passive(),
            ttl_refresh_interval_seconds: default_ttl_refresh_interval(),
            ttl_refresh_interval_passive_seconds: default_ttl_refresh_interval_passive(),
            visibility_debounce_ms: default_visibility_debounce_ms(),
            election_window_ms: default_election_window_ms(),
            fast_election_delay_ms: default_fast_election_delay_ms(),
            leader_beat_interval_seconds: default_leader_beat_interval(),
            leader_beat_timeout_seconds: default_leader_beat_timeout(),
            peer_ttl_seconds: default_peer_ttl(),
            join_cooldown_ms: default_join_cooldown_ms(),
            switch_settle_ms: default_switch_settle_ms(),
            idle_to_passive_seconds: default_idle_to_passive(),
            passive_to_removed_seconds: default_passive_to_removed(),
            session_idle_window_hours: default_session_idle_window(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_cap_ms: default_reconnect_cap_ms(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_polling_interval() -> u64 {
    45
}

fn default_polling_interval_passive() -> u64 {
    5400
}

fn default_ttl_refresh_interval() -> u64 {
    120
}

fn default_ttl_refresh_interval_passive() -> u64 {
    5400
}

fn default_visibility_debounce_ms() -> u64 {
    500
}

fn default_election_window_ms() -> u64 {
    80
}

fn default_fast_election_delay_ms() -> u64 {
    20
}

fn default_leader_beat_interval() -> u64 {
    2
}

fn default_leader_beat_timeout() -> u64 {
    3
}

fn default_peer_ttl() -> u64 {
    30
}

fn default_join_cooldown_ms() -> u64 {
    1000
}

fn default_switch_settle_ms() -> u64 {
    100
}

fn default_idle_to_passive() -> u64 {
    300
}

fn default_passive_to_removed() -> u64 {
    240
}

fn default_session_idle_window() -> u64 {
    24
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_base_ms() -> u64 {
    1000
}

fn default_reconnect_cap_ms() -> u64 {
    30000
}
