//! # beacon-presence
//!
//! The server-side presence core:
//! - [`store::PresenceStore`] — TTL'd record per `(customer, session)` over
//!   the cache provider, plus EMA persistence and metrics publishing.
//! - [`service::PresenceService`] — JOIN / BEAT / LEAVE / TTL-refresh
//!   semantics with idempotency markers and tombstones.
//! - [`disconnect::DisconnectResolver`] — delayed verify-then-remove for
//!   handheld sessions whose sockets die without a LEAVE.
//! - [`ema::EmaEngine`] — periodic sampling and exponential smoothing of the
//!   live count per customer.

pub mod disconnect;
pub mod ema;
pub mod service;
pub mod store;

pub use disconnect::DisconnectResolver;
pub use ema::{EmaEngine, MetricsSink};
pub use service::PresenceService;
pub use store::PresenceStore;
