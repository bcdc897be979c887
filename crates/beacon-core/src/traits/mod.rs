//! Abstract interfaces implemented by infrastructure crates.

pub mod cache;
