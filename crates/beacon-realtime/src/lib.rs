//! # beacon-realtime
//!
//! The WebSocket fleet:
//! - per-connection handles with liveness and ping-miss accounting
//! - a pool indexed by connection id and by customer for fan-out
//! - the fleet manager handling `auth` / `ttl_refresh` / `ping`
//! - server-driven heartbeat with a miss counter
//! - the engine tying the fleet to the EMA sampler with graceful shutdown
//!
//! The crate is transport-library agnostic: outbound traffic is an
//! [`connection::handle::OutboundFrame`] stream that the HTTP layer maps onto
//! actual WebSocket frames.

pub mod connection;
pub mod server;

pub use connection::manager::ClientFleet;
pub use server::RealtimeEngine;
