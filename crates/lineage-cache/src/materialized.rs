//! Materialized "nearest ancestor of type T" tables
//!
//! For every seed node of a source type, the table records, per ancestor
//! type, either the single ancestor of that type or how many there are.
//! Several candidates are never collapsed to an arbitrary pick.

use lineage_graph::{
    traverse, CommitSeq, Direction, GraphSource, ObjectId, RowId, TraversalOptions, TypeKey,
    Watermark,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default ancestor search depth, in hops
pub const DEFAULT_ANCESTOR_DEPTH: u32 = 20;

/// Outcome of an ancestor lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AncestorLookup {
    /// Exactly one ancestor of the target type
    Unique {
        /// Ancestor node
        node: ObjectId,
        /// Its row id
        row_id: RowId,
    },
    /// This many ancestors of the target type
    Ambiguous(u32),
}

/// Ancestor table for all seeds of one source type
#[derive(Debug, Clone)]
pub struct CachedClosure {
    source: TypeKey,
    watermark: Watermark,
    built_at: CommitSeq,
    seeds: usize,
    rows: HashMap<(ObjectId, TypeKey), AncestorLookup>,
}

impl CachedClosure {
    /// Traverse the ancestors of every node of `source`, up to `depth` hops
    pub fn build(graph: &dyn GraphSource, source: TypeKey, depth: u32) -> Self {
        let options = TraversalOptions::new().with_depth(depth);
        let seeds = graph.nodes_of_type(source);
        let mut rows = HashMap::new();

        for seed in &seeds {
            let closure = traverse(graph, &[seed.object_id], Direction::Parents, &options);
            let mut groups: HashMap<TypeKey, Vec<(ObjectId, RowId)>> = HashMap::new();
            for reached in closure.reached.values() {
                let Some(node) = graph.node(reached.node) else {
                    continue;
                };
                if let Some(target) = node.type_key.filter(|t| t.is_lookup_target()) {
                    groups
                        .entry(target)
                        .or_default()
                        .push((node.object_id, node.row_id));
                }
            }
            for (target, found) in groups {
                let lookup = match found.as_slice() {
                    [(node, row_id)] => AncestorLookup::Unique {
                        node: *node,
                        row_id: *row_id,
                    },
                    many => {
                        AncestorLookup::Ambiguous(u32::try_from(many.len()).unwrap_or(u32::MAX))
                    }
                };
                rows.insert((seed.object_id, target), lookup);
            }
        }

        Self {
            source,
            watermark: graph.watermark(source),
            built_at: graph.seq(),
            seeds: seeds.len(),
            rows,
        }
    }

    /// Nearest ancestors of `target` type for `seed`, `None` if it has none
    #[inline]
    pub fn lookup(&self, seed: ObjectId, target: TypeKey) -> Option<AncestorLookup> {
        self.rows.get(&(seed, target)).copied()
    }

    /// Source type the table was built for
    #[inline]
    pub fn source(&self) -> TypeKey {
        self.source
    }

    /// Source-type watermark at build time
    #[inline]
    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    /// Commit the table was built from
    #[inline]
    pub fn built_at(&self) -> CommitSeq {
        self.built_at
    }

    /// Number of seeds covered
    #[inline]
    pub fn seed_count(&self) -> usize {
        self.seeds
    }

    /// Number of `(seed, target)` rows
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no seed has any typed ancestor
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether `graph` still matches the state the table was built from
    pub fn is_current(&self, graph: &dyn GraphSource) -> bool {
        graph.watermark(self.source) == self.watermark
    }
}
