//! Watermark-validated closure cache using moka
//!
//! Entries are built lazily on first request and trusted only while the
//! source type's watermark is unchanged. At most one build per source type
//! runs at a time; other callers for the same key wait for it and reuse the
//! result, while builds for other keys proceed independently.

use crate::error::CacheError;
use crate::materialized::{CachedClosure, DEFAULT_ANCESTOR_DEPTH};
use crate::provider::{CacheStats, ClosureProvider};
use dashmap::DashMap;
use lineage_graph::{GraphSource, TypeKey, Watermark};
use moka::sync::Cache;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default number of cached source types
pub const DEFAULT_MAX_CAPACITY: u64 = 1024;

/// Per-source-type cache of ancestor closure tables
#[derive(Debug)]
pub struct ClosureCache {
    entries: Cache<TypeKey, Arc<CachedClosure>>,
    build_locks: DashMap<TypeKey, Arc<Mutex<()>>>,
    ancestor_depth: u32,
    hits: AtomicU64,
    builds: AtomicU64,
}

impl ClosureCache {
    /// Create cache with max capacity
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self::with_depth(max_capacity, DEFAULT_ANCESTOR_DEPTH)
    }

    /// Create cache searching `ancestor_depth` hops per seed
    #[must_use]
    pub fn with_depth(max_capacity: u64, ancestor_depth: u32) -> Self {
        Self {
            entries: Cache::new(max_capacity),
            build_locks: DashMap::new(),
            ancestor_depth,
            hits: AtomicU64::new(0),
            builds: AtomicU64::new(0),
        }
    }

    /// Get approximate entry count
    #[inline]
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }

    fn current(&self, source: TypeKey, mark: Watermark) -> Option<Arc<CachedClosure>> {
        self.entries
            .get(&source)
            .filter(|entry| entry.watermark() == mark)
    }
}

impl Default for ClosureCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CAPACITY)
    }
}

impl ClosureProvider for ClosureCache {
    fn get_or_build(
        &self,
        graph: &dyn GraphSource,
        source: TypeKey,
    ) -> Result<Arc<CachedClosure>, CacheError> {
        if !source.is_lookup_target() {
            return Err(CacheError::UnsupportedSource(source));
        }

        let mark = graph.watermark(source);
        if let Some(entry) = self.current(source, mark) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(entry);
        }

        let lock = self.build_locks.entry(source).or_default().clone();
        let _guard = lock.lock();

        // Another caller may have built it while we waited
        if let Some(entry) = self.current(source, mark) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(entry);
        }

        tracing::debug!("Building closure table for {} at seq {}", source, graph.seq().0);
        self.builds.fetch_add(1, Ordering::Relaxed);
        let built = Arc::new(CachedClosure::build(graph, source, self.ancestor_depth));

        // Never replace a table built from a newer commit
        let newer_cached = self
            .entries
            .get(&source)
            .is_some_and(|entry| entry.built_at() > built.built_at());
        if !newer_cached {
            self.entries.insert(source, Arc::clone(&built));
        }
        tracing::info!(
            "Built closure table for {}: {} seed(s), {} row(s)",
            source,
            built.seed_count(),
            built.len()
        );
        Ok(built)
    }

    fn invalidate(&self, source: TypeKey) {
        self.entries.invalidate(&source);
    }

    fn invalidate_all(&self) {
        self.entries.invalidate_all();
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.entries.entry_count(),
            hits: self.hits.load(Ordering::Relaxed),
            builds: self.builds.load(Ordering::Relaxed),
        }
    }
}
