//! # beacon-agent
//!
//! The agent core that runs in every tab of a customer's site:
//! - shared session identity with a 24 h idle window, fresh tab ids per load
//! - a best-effort gossip bus between same-session tabs
//! - tab registry and deterministic leader election
//! - a debounced visibility tracker
//! - the desktop session-mode state machine
//! - the unload intent classifier and beacon-style LEAVE dispatch
//! - the hybrid WebSocket/polling connection driven by mode and visibility
//!
//! Everything browser-specific (DOM listeners, `localStorage`, the real
//! `BroadcastChannel`) lives in the embedder; signals enter as typed events
//! and the state machines here stay pure enough to audit.

pub mod gossip;
pub mod identity;
pub mod mode;
pub mod runtime;
pub mod tabs;
pub mod transport;
pub mod unload;
pub mod visibility;

pub use identity::{AgentIdentity, TabId};
pub use runtime::TabRuntime;
