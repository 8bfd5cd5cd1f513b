//! Lineage Graph - provenance graph engine
//!
//! Stores a DAG of typed nodes (samples, data items, runs) connected by
//! derivation edges, and answers ancestor/descendant queries over it:
//! - Node identity registry (global id and `(kind, row_id)` lookup)
//! - Edge store with forward and reverse adjacency
//! - Write-time cycle rejection (Kahn's algorithm)
//! - Iterative closure traversal with min-depth dedup and a hop ceiling
//! - Optimistic transactions over an in-memory store
//!
//! # Example
//!
//! ```rust,ignore
//! use lineage_graph::prelude::*;
//!
//! let store = MemoryStore::new();
//! let container = ContainerId::new();
//! let (parent, child) = store.transaction(|tx| {
//!     let parent = tx.register(NewNode::new(
//!         NodeKind::Sample, 1, GlobalId::parse("S-1")?, container, "S-1",
//!     ))?;
//!     let child = tx.register(NewNode::new(
//!         NodeKind::Data, 1, GlobalId::parse("bob")?, container, "bob",
//!     ))?;
//!     tx.add_edge(NewEdge::new(parent.object_id, child.object_id))?;
//!     Ok((parent, child))
//! })?;
//!
//! let snapshot = store.snapshot();
//! let ancestors = traverse(
//!     &snapshot,
//!     &[child.object_id],
//!     Direction::Parents,
//!     &TraversalOptions::new().with_depth(2),
//! );
//! assert!(ancestors.contains(parent.object_id));
//! ```

#![warn(unreachable_pub)]

pub mod closure;
pub mod cycle;
pub mod edges;
pub mod error;
pub mod registry;
pub mod source;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use closure::{
    traverse, Closure, Direction, Reached, TraversalOptions, TraversedEdge,
    DEFAULT_TRAVERSAL_CEILING,
};
pub use cycle::{check_new_edges, detect_cycle, has_cycle, validate_graph};
pub use edges::EdgeTable;
pub use error::{LineageError, NodeRef, Result, StorageError};
pub use registry::NodeRegistry;
pub use source::GraphSource;
pub use store::{GraphState, MemoryStore, Transaction};
pub use types::{
    truncate_role, CommitSeq, ContainerId, Edge, EdgeFilter, EdgeId, GlobalId, NewEdge, NewNode,
    Node, NodeKind, ObjectId, RowId, RowKey, TypeKey, Watermark, DEFAULT_MAX_ROLE_LEN,
    MAX_GLOBAL_ID_LEN,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the lineage graph
    pub use crate::{
        traverse, ContainerId, Direction, EdgeFilter, GlobalId, GraphSource, LineageError,
        MemoryStore, NewEdge, NewNode, Node, NodeKind, ObjectId, RowKey, TraversalOptions,
        TypeKey,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
