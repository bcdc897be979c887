//! Presence store TTL policy and EMA engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::types::mode::SessionMode;

/// Hard upper bound on any presence record TTL, regardless of configuration.
const MAX_TTL_SECONDS: u64 = 600;

/// Presence store and smoothing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Record TTL for sessions in `active` mode, in seconds.
    #[serde(default = "default_active_ttl")]
    pub active_ttl_seconds: u64,
    /// Record TTL for sessions in `passive_active` mode, in seconds.
    #[serde(default = "default_passive_ttl")]
    pub passive_ttl_seconds: u64,
    /// TTL for LEAVE tombstones and seen-leave idempotency markers, in seconds.
    #[serde(default = "default_tombstone_ttl")]
    pub tombstone_ttl_seconds: u64,
    /// Smoothing factor for the exponential moving average. Must be in (0, 1).
    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: f64,
    /// Interval between EMA sampling ticks, in seconds.
    #[serde(default = "default_ema_interval")]
    pub ema_update_interval_seconds: u64,
}

impl PresenceConfig {
    /// Returns the TTL applied to a presence record in the given mode.
    ///
    /// Clamped to the 10 minute ceiling no matter what the configuration says.
    pub fn ttl_for(&self, mode: SessionMode) -> Duration {
        let secs = match mode {
            SessionMode::Active => self.active_ttl_seconds,
            SessionMode::PassiveActive => self.passive_ttl_seconds,
        };
        Duration::from_secs(secs.min(MAX_TTL_SECONDS))
    }

    /// TTL for tombstones and idempotency markers.
    pub fn tombstone_ttl(&self) -> Duration {
        Duration::from_secs(self.tombstone_ttl_seconds)
    }

    /// Interval between EMA ticks.
    pub fn ema_interval(&self) -> Duration {
        Duration::from_secs(self.ema_update_interval_seconds)
    }

    /// Rejects out-of-range smoothing factors.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.ema_alpha <= 0.0 || self.ema_alpha >= 1.0 {
            return Err(AppError::configuration(format!(
                "ema_alpha must be in (0, 1), got {}",
                self.ema_alpha
            )));
        }
        Ok(())
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            active_ttl_seconds: default_active_ttl(),
            passive_ttl_seconds: default_passive_ttl(),
            tombstone_ttl_seconds: default_tombstone_ttl(),
            ema_alpha: default_ema_alpha(),
            ema_update_interval_seconds: default_ema_interval(),
        }
    }
}

fn default_active_ttl() -> u64 {
    600
}

fn default_passive_ttl() -> u64 {
    300
}

fn default_tombstone_ttl() -> u64 {
    30
}

fn default_ema_alpha() -> f64 {
    0.2
}

fn default_ema_interval() -> u64 {
    30
}
