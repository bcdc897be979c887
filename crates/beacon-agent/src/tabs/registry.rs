//! Per-tab peer registry.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::gossip::message::TabState;
use crate::identity::TabId;

/// Tab counts reported in JOIN payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabCounts {
    /// All tabs of the session, this one included.
    pub total: u32,
    /// Backgrounded tabs among the total.
    pub background: u32,
}

/// One known sibling tab.
#[derive(Debug, Clone)]
struct PeerEntry {
    state: TabState,
    last_seen: Instant,
}

/// The local view of the session's tabs.
///
/// Owned by a single tab's event loop; cross-tab coordination is messages
/// only, so no locking.
#[derive(Debug)]
pub struct TabRegistry {
    own_state: TabState,
    peers: HashMap<TabId, PeerEntry>,
    peer_ttl: Duration,
}

impl TabRegistry {
    /// Creates a registry for one tab. The initial own state is foreground;
    /// the first real visibility event corrects it.
    pub fn new(peer_ttl: Duration) -> Self {
        Self {
            own_state: TabState::Foreground,
            peers: HashMap::new(),
            peer_ttl,
        }
    }

    /// Records a peer sighting.
    pub fn observe(&mut self, tab_id: TabId, state: TabState, now: Instant) {
        self.peers.insert(
            tab_id,
            PeerEntry {
                state,
                last_seen: now,
            },
        );
    }

    /// Forgets a peer (graceful close).
    pub fn remove(&mut self, tab_id: &TabId) {
        self.peers.remove(tab_id);
    }

    /// Last known state of a peer.
    pub fn peer_state(&self, tab_id: &TabId) -> Option<TabState> {
        self.peers.get(tab_id).map(|peer| peer.state)
    }

    /// Drops peers unseen past the TTL. Returns whether anything changed.
    pub fn prune(&mut self, now: Instant) -> bool {
        let before = self.peers.len();
        let ttl = self.peer_ttl;
        self.peers
            .retain(|_, peer| now.duration_since(peer.last_seen) <= ttl);
        self.peers.len() != before
    }

    /// Updates this tab's own state.
    pub fn set_own_state(&mut self, state: TabState) {
        self.own_state = state;
    }

    /// This tab's own state.
    pub fn own_state(&self) -> TabState {
        self.own_state
    }

    /// Counts across self and live peers.
    pub fn counts(&self) -> TabCounts {
        let mut total = 1u32;
        let mut background = u32::from(!self.own_state.is_foreground());
        for peer in self.peers.values() {
            total += 1;
            background += u32::from(!peer.state.is_foreground());
        }
        TabCounts { total, background }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tab(id: &str) -> TabId {
        TabId(id.to_string())
    }

    #[tokio::test]
    async fn counts_include_self() {
        let registry = TabRegistry::new(Duration::from_secs(30));
        assert_eq!(
            registry.counts(),
            TabCounts {
                total: 1,
                background: 0
            }
        );
    }

    #[tokio::test]
    async fn counts_track_peer_states() {
        let mut registry = TabRegistry::new(Duration::from_secs(30));
        let now = Instant::now();
        registry.observe(tab("b"), TabState::Background, now);
        registry.observe(tab("c"), TabState::Foreground, now);

        assert_eq!(
            registry.counts(),
            TabCounts {
                total: 3,
                background: 1
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stale_peers_are_pruned() {
        let mut registry = TabRegistry::new(Duration::from_secs(30));
        registry.observe(tab("b"), TabState::Foreground, Instant::now());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(registry.prune(Instant::now()));
        assert_eq!(registry.counts().total, 1);
    }

    #[tokio::test]
    async fn duplicate_sightings_collapse() {
        let mut registry = TabRegistry::new(Duration::from_secs(30));
        let now = Instant::now();
        registry.observe(tab("b"), TabState::Foreground, now);
        registry.observe(tab("b"), TabState::Background, now);
        assert_eq!(
            registry.counts(),
            TabCounts {
                total: 2,
                background: 1
            }
        );
    }
}
