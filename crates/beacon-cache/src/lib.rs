//! # beacon-cache
//!
//! Key/value providers behind [`beacon_core::traits::cache::CacheProvider`]:
//! a Redis backend for production and an in-memory backend for tests and
//! single-node runs. Also centralizes the persisted key layout.

pub mod keys;
pub mod memory;
pub mod provider;
pub mod redis;

pub use provider::CacheManager;
