//! Server transports: REST, WebSocket, and the hybrid selection logic.

pub mod api;
pub mod backoff;
pub mod hybrid;
pub mod socket;

pub use backoff::ReconnectBackoff;
pub use hybrid::{HybridConnection, TransportKind, select_transport};
