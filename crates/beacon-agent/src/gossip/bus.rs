//! The gossip bus: a named broadcast channel scoped to `customer:session`.
//!
//! In a browser this is a `BroadcastChannel`; here it is a registry of
//! `tokio::sync::broadcast` channels, which gives the same best-effort,
//! no-cross-sender-ordering semantics and lets tests run whole multi-tab
//! scenarios in one process.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;

use super::message::GossipEnvelope;

/// Buffer for each scoped channel; gossip traffic is tiny.
const CHANNEL_BUFFER: usize = 64;

/// Sender/receiver pair for one tab on a scoped channel.
pub trait GossipBus: Send + Sync + std::fmt::Debug {
    /// Broadcasts an envelope to every peer, best-effort.
    fn send(&self, envelope: GossipEnvelope);

    /// Subscribes to the channel. Receivers see their own sends; callers
    /// must drop envelopes carrying their own tab id.
    fn subscribe(&self) -> broadcast::Receiver<GossipEnvelope>;
}

/// Registry of scoped gossip channels.
#[derive(Debug, Clone, Default)]
pub struct GossipHub {
    channels: Arc<DashMap<String, broadcast::Sender<GossipEnvelope>>>,
}

impl GossipHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins the channel scoped to `customer:session`.
    pub fn join(&self, customer_id: &str, session_id: &str) -> LocalGossipBus {
        let scope = format!("{customer_id}:{session_id}");
        let tx = self
            .channels
            .entry(scope)
            .or_insert_with(|| broadcast::channel(CHANNEL_BUFFER).0)
            .clone();
        LocalGossipBus { tx }
    }
}

/// One tab's handle on a scoped channel.
#[derive(Debug, Clone)]
pub struct LocalGossipBus {
    tx: broadcast::Sender<GossipEnvelope>,
}

impl GossipBus for LocalGossipBus {
    fn send(&self, envelope: GossipEnvelope) {
        // No receivers is fine: a sole tab gossips into the void.
        let _ = self.tx.send(envelope);
    }

    fn subscribe(&self) -> broadcast::Receiver<GossipEnvelope> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gossip::message::GossipMessage;
    use crate::identity::TabId;

    #[tokio::test]
    async fn scoped_channels_are_isolated() {
        let hub = GossipHub::new();
        let acme = hub.join("acme", "s1");
        let other = hub.join("acme", "s2");

        let mut acme_rx = acme.subscribe();
        let mut other_rx = other.subscribe();

        acme.send(GossipEnvelope::new(
            TabId("t1".to_string()),
            GossipMessage::WhoIsHere,
        ));

        assert_eq!(
            acme_rx.recv().await.unwrap().message,
            GossipMessage::WhoIsHere
        );
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn peers_on_the_same_scope_see_each_other() {
        let hub = GossipHub::new();
        let a = hub.join("acme", "s1");
        let b = hub.join("acme", "s1");

        let mut b_rx = b.subscribe();
        a.send(GossipEnvelope::new(
            TabId("t-a".to_string()),
            GossipMessage::LeaderBeat,
        ));

        let envelope = b_rx.recv().await.unwrap();
        assert_eq!(envelope.tab_id.as_str(), "t-a");
    }
}
