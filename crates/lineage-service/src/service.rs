//! Lineage projection API
//!
//! Reads run against a snapshot of the last committed graph, so a query
//! never observes a half-applied transaction.

use crate::config::LineageConfig;
use crate::error::Result;
use crate::options::{Depth, LineageOptions};
use crate::result::{EdgeDetail, LineageEdge, LineageEntry, LineageResult};
use crate::retry::{WriteCounts, WriteStats};
use lineage_cache::{AncestorLookup, CacheStats, ClosureCache, ClosureProvider};
use lineage_graph::{
    traverse, Closure, Direction, GlobalId, GraphSource, GraphState, LineageError, MemoryStore,
    Node, NodeKind, NodeRef, ObjectId, RowKey, TraversalOptions, TypeKey,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Lineage service over a shared store and closure cache
pub struct LineageService {
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) cache: Arc<dyn ClosureProvider>,
    pub(crate) config: LineageConfig,
    pub(crate) writes: WriteStats,
}

impl std::fmt::Debug for LineageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineageService")
            .field("seq", &self.store.seq())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LineageService {
    /// Create a service with its own store and cache
    ///
    /// # Errors
    /// `Config` if `config` fails validation.
    pub fn new(config: LineageConfig) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(MemoryStore::with_max_role_len(config.max_role_len));
        let cache = Arc::new(ClosureCache::with_depth(
            config.cache.max_capacity,
            config.cache.ancestor_depth,
        ));
        tracing::info!(
            "Lineage service ready (ceiling {}, cache capacity {})",
            config.traversal_ceiling,
            config.cache.max_capacity
        );
        Ok(Self::with_parts(store, cache, config))
    }

    /// Assemble a service from existing parts
    pub fn with_parts(
        store: Arc<MemoryStore>,
        cache: Arc<dyn ClosureProvider>,
        config: LineageConfig,
    ) -> Self {
        Self {
            store,
            cache,
            config,
            writes: WriteStats::default(),
        }
    }

    /// Backing store
    #[inline]
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Active configuration
    #[inline]
    pub fn config(&self) -> &LineageConfig {
        &self.config
    }

    /// Node bound to `global_id`
    ///
    /// # Errors
    /// `UnknownNode` if nothing is registered under it.
    pub fn resolve(&self, global_id: &GlobalId) -> Result<Node> {
        self.store
            .snapshot()
            .resolve_global(global_id)
            .cloned()
            .ok_or_else(|| LineageError::UnknownNode(NodeRef::Global(global_id.clone())).into())
    }

    /// Node registered as `(kind, row_id)`
    ///
    /// # Errors
    /// `UnknownNode` if nothing is registered under it.
    pub fn resolve_row(&self, kind: NodeKind, row_id: i64) -> Result<Node> {
        let key = RowKey::new(kind, row_id);
        self.store
            .snapshot()
            .resolve_row(key)
            .cloned()
            .ok_or_else(|| LineageError::UnknownNode(NodeRef::Row(key)).into())
    }

    /// Ancestors and/or descendants of `seeds`
    ///
    /// Seeds without connections give an empty result.
    ///
    /// # Errors
    /// `UnknownNode` for the first seed that is not registered.
    pub fn get_lineage(
        &self,
        seeds: &[GlobalId],
        options: &LineageOptions,
    ) -> Result<LineageResult> {
        let snapshot = self.store.snapshot();
        let mut seed_nodes = seeds
            .iter()
            .map(|gid| {
                snapshot
                    .resolve_global(gid)
                    .cloned()
                    .ok_or_else(|| LineageError::UnknownNode(NodeRef::Global(gid.clone())))
            })
            .collect::<std::result::Result<Vec<Node>, _>>()?;
        let mut seen = HashSet::new();
        seed_nodes.retain(|node| seen.insert(node.object_id));
        if seed_nodes.is_empty() {
            return Ok(LineageResult::default());
        }
        let seed_ids: Vec<ObjectId> = seed_nodes.iter().map(|n| n.object_id).collect();

        let mut traversal = TraversalOptions::new().with_ceiling(self.config.traversal_ceiling);
        if let Depth::Bounded(depth) = options.depth {
            traversal = traversal.with_depth(depth);
        }
        if let Some(key) = &options.source_key {
            traversal = traversal.with_source_key(key.clone());
        }

        let mut result = LineageResult::default();
        let mut runs: BTreeMap<ObjectId, i32> = BTreeMap::new();
        let mut edges: Vec<LineageEdge> = Vec::new();

        for &direction in options.direction.directions() {
            let closure = traverse(&snapshot, &seed_ids, direction, &traversal);
            let sign = match direction {
                Direction::Parents => -1,
                Direction::Children => 1,
            };
            result.truncated |= closure.truncated;

            let entries = project(&snapshot, &closure, sign, options);
            match direction {
                Direction::Parents => result.ancestors = entries,
                Direction::Children => result.descendants = entries,
            }
            for (&run, &depth) in &closure.runs {
                let signed = sign * signed_depth(depth);
                runs.entry(run)
                    .and_modify(|d| {
                        if signed.abs() < d.abs() {
                            *d = signed;
                        }
                    })
                    .or_insert(signed);
            }
            if options.include_edges {
                edges.extend(closure.edges.iter().map(|e| LineageEdge {
                    id: e.id,
                    from: e.from,
                    to: e.to,
                    role: e.role.clone(),
                    run: e.run,
                    depth: sign * signed_depth(e.depth),
                }));
            }
        }

        result.runs = runs
            .into_iter()
            .filter_map(|(run, depth)| {
                let node = snapshot.node(run)?;
                options.admits(node).then(|| LineageEntry {
                    node: node.clone(),
                    depth,
                    role: NodeKind::Run.default_role().to_string(),
                    run: None,
                })
            })
            .collect();
        sort_entries(&mut result.runs);

        if options.include_seeds {
            result.seeds = seed_nodes
                .into_iter()
                .map(|node| LineageEntry {
                    role: node.kind.default_role().to_string(),
                    node,
                    depth: 0,
                    run: None,
                })
                .collect();
        }
        if options.include_edges {
            result.edges = EdgeDetail::Populated(edges);
        }

        tracing::debug!(
            "Lineage of {} seed(s): {} ancestor(s), {} descendant(s), {} run(s)",
            seeds.len(),
            result.ancestors.len(),
            result.descendants.len(),
            result.runs.len()
        );
        Ok(result)
    }

    /// Nearest ancestor of type `target` of the node bound to `seed`
    ///
    /// Answered from the materialized closure of the seed's own type.
    /// `None` if the seed has no ancestor of that type within the cache's
    /// search depth.
    ///
    /// # Errors
    /// - `UnknownNode` if `seed` is not registered
    /// - `InvalidArgument` if the seed has no type key or `target` is a protocol
    pub fn ancestor_lookup(
        &self,
        seed: &GlobalId,
        target: TypeKey,
    ) -> Result<Option<AncestorLookup>> {
        if !target.is_lookup_target() {
            return Err(LineageError::InvalidArgument(format!(
                "{target} cannot be an ancestor lookup target"
            ))
            .into());
        }
        let snapshot = self.store.snapshot();
        let node = snapshot
            .resolve_global(seed)
            .ok_or_else(|| LineageError::UnknownNode(NodeRef::Global(seed.clone())))?;
        let source = node.type_key.ok_or_else(|| {
            LineageError::InvalidArgument(format!("{} has no type key", node.global_id))
        })?;
        let table = self.cache.get_or_build(&snapshot, source)?;
        Ok(table.lookup(node.object_id, target))
    }

    /// Drop cached closures for `type_key`, or all of them
    pub fn invalidate_cache(&self, type_key: Option<TypeKey>) {
        match type_key {
            Some(key) => self.cache.invalidate(key),
            None => self.cache.invalidate_all(),
        }
    }

    /// Closure cache statistics
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Write path statistics
    pub fn write_stats(&self) -> WriteCounts {
        self.writes.counts()
    }
}

fn signed_depth(depth: u32) -> i32 {
    i32::try_from(depth).unwrap_or(i32::MAX)
}

fn project(
    graph: &GraphState,
    closure: &Closure,
    sign: i32,
    options: &LineageOptions,
) -> Vec<LineageEntry> {
    let mut entries: Vec<LineageEntry> = closure
        .reached
        .values()
        .filter_map(|reached| {
            let node = graph.node(reached.node)?;
            options.admits(node).then(|| LineageEntry {
                node: node.clone(),
                depth: sign * signed_depth(reached.depth),
                role: reached.role.clone(),
                run: reached.run,
            })
        })
        .collect();
    sort_entries(&mut entries);
    entries
}

fn sort_entries(entries: &mut [LineageEntry]) {
    entries.sort_by_key(|e| (e.depth.unsigned_abs(), e.node.object_id));
}
