//! # beacon-api
//!
//! HTTP API layer for Beacon built on Axum.
//!
//! Provides the REST endpoints (`/presence/join`, `/presence/leave`,
//! `/active-users/metrics`, `/health`), the WebSocket upgrade at
//! `/ws/active-users`, the rate-limit and logging middleware, and the
//! application bootstrap.

pub mod app;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::{build_state, run_server};
pub use router::build_router;
pub use state::AppState;
