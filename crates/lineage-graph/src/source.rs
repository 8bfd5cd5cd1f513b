//! Read access to a consistent view of the graph
//!
//! Traversal, cycle detection and the closure cache only ever read through
//! [`GraphSource`], so any backing store that can answer point lookups and
//! adjacency queries can drive them.

use crate::types::{CommitSeq, Edge, GlobalId, Node, ObjectId, RowKey, TypeKey, Watermark};

/// Consistent read view of nodes and edges
pub trait GraphSource {
    /// Node by surrogate key
    fn node(&self, id: ObjectId) -> Option<&Node>;

    /// Node by global id
    fn resolve_global(&self, global_id: &GlobalId) -> Option<&Node>;

    /// Node by `(kind, row_id)`
    fn resolve_row(&self, key: RowKey) -> Option<&Node>;

    /// Edges whose input is `id`
    fn edges_from(&self, id: ObjectId) -> Vec<&Edge>;

    /// Edges whose output is `id`
    fn edges_to(&self, id: ObjectId) -> Vec<&Edge>;

    /// Nodes carrying `type_key`
    fn nodes_of_type(&self, type_key: TypeKey) -> Vec<&Node>;

    /// Every stored edge
    fn all_edges(&self) -> Vec<&Edge>;

    /// Change signal for nodes carrying `type_key`
    fn watermark(&self, type_key: TypeKey) -> Watermark;

    /// Last commit visible in this view
    fn seq(&self) -> CommitSeq;
}
