//! Presence record store over the cache provider.
//!
//! One JSON record per `(customer, session)` with a TTL chosen by session
//! mode. Followers never write, so every mutation here comes from a single
//! leader tab; cross-key transactions are never needed.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use beacon_cache::keys;
use beacon_cache::provider::CacheManager;
use beacon_core::config::presence::PresenceConfig;
use beacon_core::result::AppResult;
use beacon_core::traits::cache::CacheProvider;
use beacon_core::types::mode::SessionMode;
use beacon_core::types::record::PresenceRecord;
use beacon_core::types::wire::{MetricsPayload, ServerMessage};

/// Keyed, TTL'd presence store.
#[derive(Debug, Clone)]
pub struct PresenceStore {
    /// Cache backend.
    cache: Arc<CacheManager>,
    /// TTL policy.
    config: PresenceConfig,
}

impl PresenceStore {
    /// Creates a store over the given cache.
    pub fn new(cache: Arc<CacheManager>, config: PresenceConfig) -> Self {
        Self { cache, config }
    }

    /// Returns the TTL policy configuration.
    pub fn config(&self) -> &PresenceConfig {
        &self.config
    }

    /// Writes a record with a fresh TTL derived from its session mode.
    pub async fn set(&self, mut record: PresenceRecord) -> AppResult<()> {
        record.touch(Utc::now());
        let key = keys::presence(&record.customer_id, &record.session_id);
        let ttl = self.config.ttl_for(record.session_mode);
        self.cache.set_json(&key, &record, ttl).await?;

        debug!(
            customer_id = %record.customer_id,
            session_id = %record.session_id,
            session_mode = %record.session_mode,
            ttl_seconds = ttl.as_secs(),
            "Presence record written"
        );
        Ok(())
    }

    /// Merges a record over the stored one, preserving the remaining TTL.
    ///
    /// `createdAt` always comes from the stored record; a missing record is
    /// created anew with a fresh TTL instead of failing.
    pub async fn update(&self, mut record: PresenceRecord) -> AppResult<()> {
        let key = keys::presence(&record.customer_id, &record.session_id);
        match self.get(&record.customer_id, &record.session_id).await? {
            Some(stored) => {
                record.created_at = stored.created_at;
                record.touch(Utc::now());
                let json = serde_json::to_string(&record)?;
                self.cache.set_keep_ttl(&key, &json).await
            }
            None => {
                warn!(key = %key, "Update on missing presence record, creating anew");
                self.set(record).await
            }
        }
    }

    /// Extends the record's TTL, optionally persisting a changed session mode.
    ///
    /// The TTL becomes the full budget of the effective mode. Missing keys
    /// are a warned no-op: a refresh payload cannot rebuild a record.
    pub async fn refresh_ttl(
        &self,
        customer_id: &str,
        session_id: &str,
        mode: Option<SessionMode>,
    ) -> AppResult<()> {
        let key = keys::presence(customer_id, session_id);
        let Some(mut record) = self.get(customer_id, session_id).await? else {
            warn!(key = %key, "TTL refresh on missing presence record");
            return Ok(());
        };

        if let Some(new_mode) = mode {
            if new_mode != record.session_mode {
                record.session_mode = new_mode;
                record.touch(Utc::now());
                let json = serde_json::to_string(&record)?;
                self.cache.set_keep_ttl(&key, &json).await?;
            }
        }

        let ttl = self.config.ttl_for(record.session_mode);
        self.cache.expire(&key, ttl).await?;

        debug!(
            customer_id = %customer_id,
            session_id = %session_id,
            session_mode = %record.session_mode,
            ttl_seconds = ttl.as_secs(),
            "Presence TTL refreshed"
        );
        Ok(())
    }

    /// Deletes the record. Missing keys are a no-op.
    pub async fn remove(&self, customer_id: &str, session_id: &str) -> AppResult<()> {
        let key = keys::presence(customer_id, session_id);
        self.cache.delete(&key).await
    }

    /// Reads the record, if present.
    pub async fn get(
        &self,
        customer_id: &str,
        session_id: &str,
    ) -> AppResult<Option<PresenceRecord>> {
        let key = keys::presence(customer_id, session_id);
        self.cache.get_json(&key).await
    }

    /// Unique live session ids for a customer.
    pub async fn get_active_sessions(&self, customer_id: &str) -> AppResult<Vec<String>> {
        let pattern = keys::presence_pattern(customer_id);
        let found = self.cache.scan(&pattern).await?;

        let unique: HashSet<String> = found
            .iter()
            .filter_map(|key| keys::session_from_presence_key(key))
            .map(str::to_string)
            .collect();

        Ok(unique.into_iter().collect())
    }

    /// Number of unique live sessions for a customer.
    pub async fn get_active_count(&self, customer_id: &str) -> AppResult<u64> {
        Ok(self.get_active_sessions(customer_id).await?.len() as u64)
    }

    /// Remaining TTL of the record in seconds (`-1` no expiry, `-2` absent).
    pub async fn get_key_ttl(&self, customer_id: &str, session_id: &str) -> AppResult<i64> {
        let key = keys::presence(customer_id, session_id);
        self.cache.ttl(&key).await
    }

    /// Persists the smoothed count for a customer.
    pub async fn set_ema(&self, customer_id: &str, value: f64) -> AppResult<()> {
        // EMA values have no expiry; set_keep_ttl writes without one.
        self.cache
            .set_keep_ttl(&keys::ema(customer_id), &value.to_string())
            .await
    }

    /// Reads the smoothed count for a customer.
    pub async fn get_ema(&self, customer_id: &str) -> AppResult<Option<f64>> {
        let raw = self.cache.get(&keys::ema(customer_id)).await?;
        Ok(raw.and_then(|value| value.parse().ok()))
    }

    /// Publishes a metrics update on the customer's pub/sub channel.
    pub async fn publish_metrics(
        &self,
        customer_id: &str,
        payload: &MetricsPayload,
    ) -> AppResult<()> {
        let message = ServerMessage::MetricsUpdate {
            data: payload.clone(),
        };
        let json = serde_json::to_string(&message)?;
        self.cache
            .publish(&keys::metrics_channel(customer_id), &json)
            .await?;
        Ok(())
    }

    // ── Leave idempotency markers ──────────────────────────

    /// Records a leave id; returns `false` when it was already seen.
    pub async fn mark_seen_leave(&self, leave_id: &str) -> AppResult<bool> {
        self.cache
            .set_nx(&keys::seen_leave(leave_id), "1", self.config.tombstone_ttl())
            .await
    }

    /// Writes the tombstone that suppresses a late JOIN from a departed tab.
    pub async fn write_leave_tombstone(
        &self,
        customer_id: &str,
        session_id: &str,
        tab_id: &str,
    ) -> AppResult<()> {
        let key = keys::leave_tombstone(customer_id, session_id, tab_id);
        let stamp = Utc::now().timestamp_millis().to_string();
        self.cache
            .set(&key, &stamp, self.config.tombstone_ttl())
            .await
    }

    /// Whether a leave tombstone is live for this tab.
    pub async fn has_leave_tombstone(
        &self,
        customer_id: &str,
        session_id: &str,
        tab_id: &str,
    ) -> AppResult<bool> {
        let key = keys::leave_tombstone(customer_id, session_id, tab_id);
        self.cache.exists(&key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use beacon_cache::memory::MemoryCacheProvider;
    use beacon_core::types::wire::JoinRequest;

    fn make_store() -> PresenceStore {
        let cache = Arc::new(CacheManager::from_provider(Arc::new(
            MemoryCacheProvider::default(),
        )));
        PresenceStore::new(cache, PresenceConfig::default())
    }

    fn record(customer: &str, session: &str, tab: &str, mode: SessionMode) -> PresenceRecord {
        let join = JoinRequest {
            customer_id: Some(customer.to_string()),
            session_id: Some(session.to_string()),
            tab_id: Some(tab.to_string()),
            session_mode: Some(mode),
            ..Default::default()
        };
        PresenceRecord::from_join(&join, Utc::now())
    }

    #[tokio::test]
    async fn set_applies_mode_ttl() {
        let store = make_store();
        store
            .set(record("acme", "s1", "t1", SessionMode::Active))
            .await
            .unwrap();
        assert_eq!(store.get_key_ttl("acme", "s1").await.unwrap(), 600);

        store
            .set(record("acme", "s2", "t1", SessionMode::PassiveActive))
            .await
            .unwrap();
        assert_eq!(store.get_key_ttl("acme", "s2").await.unwrap(), 300);
    }

    #[tokio::test(start_paused = true)]
    async fn update_preserves_ttl_and_created_at() {
        let store = make_store();
        store
            .set(record("acme", "s1", "t1", SessionMode::Active))
            .await
            .unwrap();
        let created = store.get("acme", "s1").await.unwrap().unwrap().created_at;

        tokio::time::advance(Duration::from_secs(100)).await;

        let mut updated = record("acme", "s1", "t2", SessionMode::Active);
        updated.total_tab_quantity = 4;
        store.update(updated).await.unwrap();

        let stored = store.get("acme", "s1").await.unwrap().unwrap();
        assert_eq!(stored.created_at, created);
        assert_eq!(stored.tab_id, "t2");
        assert_eq!(stored.total_tab_quantity, 4);
        // TTL kept ticking down instead of being reset.
        assert_eq!(store.get_key_ttl("acme", "s1").await.unwrap(), 500);
    }

    #[tokio::test]
    async fn update_on_missing_record_creates_anew() {
        let store = make_store();
        store
            .update(record("acme", "ghost", "t1", SessionMode::Active))
            .await
            .unwrap();
        assert!(store.get("acme", "ghost").await.unwrap().is_some());
        assert_eq!(store.get_key_ttl("acme", "ghost").await.unwrap(), 600);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_ttl_extends_to_mode_budget() {
        let store = make_store();
        store
            .set(record("acme", "s1", "t1", SessionMode::Active))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(400)).await;
        assert_eq!(store.get_key_ttl("acme", "s1").await.unwrap(), 200);

        store.refresh_ttl("acme", "s1", None).await.unwrap();
        assert_eq!(store.get_key_ttl("acme", "s1").await.unwrap(), 600);
    }

    #[tokio::test]
    async fn refresh_ttl_persists_mode_change() {
        let store = make_store();
        store
            .set(record("acme", "s1", "t1", SessionMode::Active))
            .await
            .unwrap();

        store
            .refresh_ttl("acme", "s1", Some(SessionMode::PassiveActive))
            .await
            .unwrap();

        let stored = store.get("acme", "s1").await.unwrap().unwrap();
        assert_eq!(stored.session_mode, SessionMode::PassiveActive);
        assert_eq!(store.get_key_ttl("acme", "s1").await.unwrap(), 300);
    }

    #[tokio::test]
    async fn refresh_ttl_on_missing_record_is_a_noop() {
        let store = make_store();
        store.refresh_ttl("acme", "ghost", None).await.unwrap();
        assert_eq!(store.get_key_ttl("acme", "ghost").await.unwrap(), -2);
    }

    #[tokio::test]
    async fn active_sessions_are_unique_per_customer() {
        let store = make_store();
        store
            .set(record("acme", "s1", "t1", SessionMode::Active))
            .await
            .unwrap();
        store
            .set(record("acme", "s2", "t1", SessionMode::Active))
            .await
            .unwrap();
        store
            .set(record("globex", "s9", "t1", SessionMode::Active))
            .await
            .unwrap();

        assert_eq!(store.get_active_count("acme").await.unwrap(), 2);
        assert_eq!(store.get_active_count("globex").await.unwrap(), 1);

        let mut sessions = store.get_active_sessions("acme").await.unwrap();
        sessions.sort();
        assert_eq!(sessions, vec!["s1", "s2"]);
    }

    #[tokio::test]
    async fn ema_roundtrip() {
        let store = make_store();
        assert_eq!(store.get_ema("acme").await.unwrap(), None);
        store.set_ema("acme", 13.6).await.unwrap();
        assert_eq!(store.get_ema("acme").await.unwrap(), Some(13.6));
    }

    #[tokio::test]
    async fn seen_leave_marker_deduplicates() {
        let store = make_store();
        assert!(store.mark_seen_leave("leave-1").await.unwrap());
        assert!(!store.mark_seen_leave("leave-1").await.unwrap());
    }
}
