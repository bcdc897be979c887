//! Tab coordination: peer registry and leader election.

pub mod leader;
pub mod registry;

pub use leader::{ElectionOutcome, LeaderElector};
pub use registry::{TabCounts, TabRegistry};
