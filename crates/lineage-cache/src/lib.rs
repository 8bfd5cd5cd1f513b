//! Lineage Cache - materialized ancestor closures
//!
//! Answers "which ancestor of type T does this seed have" lookups without
//! re-running the traversal on every request:
//! - Tables built lazily per source type and shared via `Arc`
//! - Validate-then-use: a cheap watermark check decides staleness
//! - Single-flight rebuilds per source type
//! - Injectable through [`ClosureProvider`], with a no-op provider for tests

#![warn(unreachable_pub)]

pub mod cache;
pub mod error;
pub mod materialized;
pub mod provider;

pub use cache::{ClosureCache, DEFAULT_MAX_CAPACITY};
pub use error::CacheError;
pub use materialized::{AncestorLookup, CachedClosure, DEFAULT_ANCESTOR_DEPTH};
pub use provider::{CacheStats, ClosureProvider, NoopClosureCache};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
