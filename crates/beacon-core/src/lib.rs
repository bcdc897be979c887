//! # beacon-core
//!
//! Core crate for Beacon. Contains configuration schemas, the cache provider
//! trait, shared domain and wire types, and the unified error system.
//!
//! This crate has **no** internal dependencies on other Beacon crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
