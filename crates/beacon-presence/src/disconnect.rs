//! Delayed verify-then-remove for handheld disconnects.
//!
//! Handheld tab switchers kill sockets without a LEAVE. Removing the record
//! on close would punish transient reconnects (tab duplication, navigation),
//! so removal goes through a two-stage timer: a short grace window to absorb
//! an immediate re-JOIN, then a longer wait followed by a TTL inspection.
//! A JOIN in the meantime resets the TTL well above the floor, which reads
//! as "reconnected".
//!
//! The pending map is per-process best-effort; a restart drops timers and
//! TTL expiry cleans up after them.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use beacon_core::config::realtime::RealtimeConfig;

use crate::store::PresenceStore;

/// Schedules and cancels disconnect verification timers.
#[derive(Debug)]
pub struct DisconnectResolver {
    /// Presence store.
    store: Arc<PresenceStore>,
    /// Timer configuration.
    config: RealtimeConfig,
    /// `{customer}:{session}` → pending verification task.
    pending: DashMap<String, JoinHandle<()>>,
}

impl DisconnectResolver {
    /// Creates a resolver over the given store.
    pub fn new(store: Arc<PresenceStore>, config: RealtimeConfig) -> Self {
        Self {
            store,
            config,
            pending: DashMap::new(),
        }
    }

    /// Schedules removal verification for a session.
    ///
    /// An existing timer for the same session is replaced.
    pub fn schedule(self: &Arc<Self>, customer_id: &str, session_id: &str) {
        let key = pending_key(customer_id, session_id);
        let resolver = Arc::clone(self);
        let customer = customer_id.to_string();
        let session = session_id.to_string();

        let task = tokio::spawn({
            let key = key.clone();
            async move {
                // Stage 1: absorb an immediate JOIN from tab duplication or
                // navigation.
                tokio::time::sleep(resolver.config.disconnect_grace()).await;
                // Stage 2: give a real reconnect time to land.
                tokio::time::sleep(resolver.config.disconnect_verify_delay()).await;

                resolver.verify_and_remove(&customer, &session).await;
                resolver.pending.remove(&key);
            }
        });

        if let Some(previous) = self.pending.insert(key, task) {
            previous.abort();
        }

        debug!(
            customer_id = %customer_id,
            session_id = %session_id,
            "Disconnect verification scheduled"
        );
    }

    /// Cancels the pending timer for a session, if any.
    pub fn cancel(&self, customer_id: &str, session_id: &str) {
        if let Some((_, task)) = self.pending.remove(&pending_key(customer_id, session_id)) {
            task.abort();
            debug!(
                customer_id = %customer_id,
                session_id = %session_id,
                "Disconnect verification canceled"
            );
        }
    }

    /// Number of timers currently pending.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    async fn verify_and_remove(&self, customer_id: &str, session_id: &str) {
        let ttl = match self.store.get_key_ttl(customer_id, session_id).await {
            Ok(ttl) => ttl,
            Err(e) => {
                warn!(
                    customer_id = %customer_id,
                    session_id = %session_id,
                    error = %e,
                    "Disconnect verification failed to read TTL"
                );
                return;
            }
        };

        if ttl == -2 {
            // Already expired or explicitly removed.
            return;
        }

        let floor = self.config.reconnect_ttl_floor_seconds;
        if ttl > floor {
            // A JOIN must have reset the TTL; the user reconnected.
            debug!(
                customer_id = %customer_id,
                session_id = %session_id,
                ttl_seconds = ttl,
                "Session reconnected, keeping record"
            );
            return;
        }

        if let Err(e) = self.store.remove(customer_id, session_id).await {
            warn!(
                customer_id = %customer_id,
                session_id = %session_id,
                error = %e,
                "Failed to remove record after disconnect"
            );
            return;
        }

        info!(
            customer_id = %customer_id,
            session_id = %session_id,
            ttl_seconds = ttl,
            "Removed handheld session after disconnect"
        );
    }
}

fn pending_key(customer_id: &str, session_id: &str) -> String {
    format!("{customer_id}:{session_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use beacon_cache::provider::CacheManager;
    use beacon_core::config::presence::PresenceConfig;
    use beacon_core::types::mode::SessionMode;
    use beacon_core::types::record::PresenceRecord;
    use beacon_core::types::wire::JoinRequest;

    fn make_resolver() -> (Arc<DisconnectResolver>, Arc<PresenceStore>) {
        let cache = Arc::new(CacheManager::from_provider(Arc::new(
            beacon_cache::memory::MemoryCacheProvider::default(),
        )));
        let store = Arc::new(PresenceStore::new(cache, PresenceConfig::default()));
        let resolver = Arc::new(DisconnectResolver::new(
            Arc::clone(&store),
            RealtimeConfig::default(),
        ));
        (resolver, store)
    }

    fn record(customer: &str, session: &str) -> PresenceRecord {
        let join = JoinRequest {
            customer_id: Some(customer.to_string()),
            session_id: Some(session.to_string()),
            tab_id: Some("t1".to_string()),
            session_mode: Some(SessionMode::Active),
            ..Default::default()
        };
        PresenceRecord::from_join(&join, chrono::Utc::now())
    }

    #[tokio::test(start_paused = true)]
    async fn removes_record_with_low_ttl() {
        let (resolver, store) = make_resolver();
        store.set(record("acme", "s1")).await.unwrap();
        assert_eq!(store.get_key_ttl("acme", "s1").await.unwrap(), 600);
        // Let the record approach expiry: 12 s left, under the 15 s floor.
        tokio::time::advance(Duration::from_secs(588)).await;

        resolver.schedule("acme", "s1");
        // Grace (0.5 s) + verify delay (10 s), checked before the natural
        // expiry at the 12 s mark so the removal is the resolver's doing.
        tokio::time::sleep(Duration::from_millis(10_700)).await;
        tokio::task::yield_now().await;

        assert!(store.get("acme", "s1").await.unwrap().is_none());
        assert_eq!(resolver.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_record_when_ttl_indicates_reconnect() {
        let (resolver, store) = make_resolver();
        store.set(record("acme", "s1")).await.unwrap();

        resolver.schedule("acme", "s1");
        tokio::time::sleep(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;

        // TTL ≈ 590 s, far above the 15 s floor: treated as reconnected.
        assert!(store.get("acme", "s1").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_aborts_pending_removal() {
        let (resolver, store) = make_resolver();
        store.set(record("acme", "s1")).await.unwrap();
        // 12 s left: an uncanceled timer would remove the record at ~10.5 s.
        tokio::time::advance(Duration::from_secs(588)).await;

        resolver.schedule("acme", "s1");
        assert_eq!(resolver.pending_count(), 1);

        // A JOIN lands during the grace window.
        tokio::time::sleep(Duration::from_millis(200)).await;
        resolver.cancel("acme", "s1");
        assert_eq!(resolver.pending_count(), 0);

        // Past the verify point but before natural expiry: still present.
        tokio::time::sleep(Duration::from_millis(10_800)).await;
        tokio::task::yield_now().await;

        assert!(store.get("acme", "s1").await.unwrap().is_some());
    }
}
