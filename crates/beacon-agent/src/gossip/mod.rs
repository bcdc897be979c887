//! Cross-tab gossip: typed envelopes over a named broadcast channel.

pub mod bus;
pub mod message;

pub use bus::{GossipBus, GossipHub, LocalGossipBus};
pub use message::{GossipEnvelope, GossipMessage, TabState};
