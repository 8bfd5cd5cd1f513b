//! Injectable closure provider seam

use crate::error::CacheError;
use crate::materialized::{CachedClosure, DEFAULT_ANCESTOR_DEPTH};
use lineage_graph::{GraphSource, TypeKey};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Statistics for cache performance monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries in cache
    pub entry_count: u64,
    /// Requests answered from a current entry
    pub hits: u64,
    /// Tables built (misses plus stale entries)
    pub builds: u64,
}

/// Source of materialized ancestor closures
///
/// `graph` must be a committed view; a transaction's uncommitted changes
/// would otherwise leak into shared entries.
pub trait ClosureProvider: Send + Sync {
    /// Current closure table for `source`, building it if missing or stale
    ///
    /// # Errors
    /// `UnsupportedSource` for run protocols.
    fn get_or_build(
        &self,
        graph: &dyn GraphSource,
        source: TypeKey,
    ) -> Result<Arc<CachedClosure>, CacheError>;

    /// Drop the entry for `source`
    fn invalidate(&self, source: TypeKey);

    /// Drop every entry
    fn invalidate_all(&self);

    /// Current statistics
    fn stats(&self) -> CacheStats;
}

/// Provider that never caches and rebuilds on every request
#[derive(Debug, Default)]
pub struct NoopClosureCache {
    ancestor_depth: u32,
    builds: AtomicU64,
}

impl NoopClosureCache {
    /// Build tables searching `ancestor_depth` hops
    pub fn new(ancestor_depth: u32) -> Self {
        Self {
            ancestor_depth,
            builds: AtomicU64::new(0),
        }
    }
}

impl ClosureProvider for NoopClosureCache {
    fn get_or_build(
        &self,
        graph: &dyn GraphSource,
        source: TypeKey,
    ) -> Result<Arc<CachedClosure>, CacheError> {
        if !source.is_lookup_target() {
            return Err(CacheError::UnsupportedSource(source));
        }
        let depth = if self.ancestor_depth == 0 {
            DEFAULT_ANCESTOR_DEPTH
        } else {
            self.ancestor_depth
        };
        self.builds.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(CachedClosure::build(graph, source, depth)))
    }

    fn invalidate(&self, _source: TypeKey) {}

    fn invalidate_all(&self) {}

    fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: 0,
            hits: 0,
            builds: self.builds.load(Ordering::Relaxed),
        }
    }
}
