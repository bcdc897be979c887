//! In-memory cache implementation with per-entry expiry.
//!
//! The presence store introspects remaining TTLs and writes values that must
//! preserve them, so every entry carries its own deadline. Expired entries
//! are dropped lazily on access and filtered during scans. Timers use
//! `tokio::time::Instant`, which lets tests drive expiry with paused time.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time::Instant;

use beacon_core::config::cache::MemoryCacheConfig;
use beacon_core::result::AppResult;
use beacon_core::traits::cache::CacheProvider;

/// One stored value with an optional deadline.
#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// In-memory cache provider.
#[derive(Debug)]
pub struct MemoryCacheProvider {
    /// Key → entry.
    entries: DashMap<String, MemoryEntry>,
    /// Pub/sub channel name → broadcast sender.
    channels: DashMap<String, broadcast::Sender<String>>,
    /// Buffer size for pub/sub channels.
    pubsub_buffer_size: usize,
}

impl MemoryCacheProvider {
    /// Create a new in-memory cache from configuration.
    pub fn new(config: &MemoryCacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            channels: DashMap::new(),
            pubsub_buffer_size: config.pubsub_buffer_size,
        }
    }

    /// Subscribe to a pub/sub channel.
    ///
    /// Only available on the concrete type; the Redis provider's channels are
    /// consumed by other nodes, not by this process.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.pubsub_buffer_size).0)
            .subscribe()
    }

    /// Fetch a live entry, dropping it when expired.
    fn live_entry(&self, key: &str) -> Option<MemoryEntry> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Some(entry.value().clone());
            }
        }
        // Expired: remove outside the read guard.
        self.entries
            .remove_if(key, |_, entry| entry.is_expired(now));
        None
    }
}

impl Default for MemoryCacheProvider {
    fn default() -> Self {
        Self::new(&MemoryCacheConfig::default())
    }
}

#[async_trait]
impl CacheProvider for MemoryCacheProvider {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.live_entry(key).map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn set_keep_ttl(&self, key: &str, value: &str) -> AppResult<()> {
        let expires_at = self.live_entry(key).and_then(|entry| entry.expires_at);
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        Ok(self.live_entry(key).is_some())
    }

    async fn ttl(&self, key: &str) -> AppResult<i64> {
        match self.live_entry(key) {
            None => Ok(-2),
            Some(MemoryEntry {
                expires_at: None, ..
            }) => Ok(-1),
            Some(MemoryEntry {
                expires_at: Some(deadline),
                ..
            }) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                Ok(remaining.as_secs() as i64)
            }
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        if self.live_entry(key).is_none() {
            return Ok(false);
        }
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
            return Ok(true);
        }
        Ok(false)
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool> {
        if self.live_entry(key).is_some() {
            return Ok(false);
        }
        self.set(key, value, ttl).await?;
        Ok(true)
    }

    async fn scan(&self, pattern: &str) -> AppResult<Vec<String>> {
        // Glob support is limited to the trailing-star patterns the key
        // layout actually uses.
        let prefix = pattern.trim_end_matches('*');
        let now = Instant::now();

        let keys = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && !entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();

        Ok(keys)
    }

    async fn publish(&self, channel: &str, payload: &str) -> AppResult<i64> {
        if let Some(tx) = self.channels.get(channel) {
            return Ok(tx.send(payload.to_string()).unwrap_or(0) as i64);
        }
        Ok(0)
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}
