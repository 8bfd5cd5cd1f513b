//! Error types for the lineage graph
//!
//! Mutating operations fail with:
//! - `InvalidIdentifier` for malformed or conflicting global ids
//! - `DanglingReference` for edges whose endpoints are not registered
//! - `CycleRejected` when a candidate edge set would close a cycle
//!
//! Storage contention surfaces as [`StorageError::SerializationFailure`],
//! which callers may retry by re-running the whole transaction.

use crate::types::{GlobalId, ObjectId, RowKey};

/// Main lineage error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LineageError {
    /// Malformed global id, or one already bound to another node
    #[error("invalid identifier '{global_id}': {reason}")]
    InvalidIdentifier {
        /// Offending identifier
        global_id: String,
        /// What was wrong with it
        reason: String,
    },

    /// Edge endpoint is not registered
    #[error("dangling reference: {0} is not registered")]
    DanglingReference(ObjectId),

    /// Candidate edges would close a directed cycle
    #[error("cycle rejected: {} edge(s) implicated", edges.len())]
    CycleRejected {
        /// Edges known to be involved in the cycle (not necessarily minimal)
        edges: Vec<(ObjectId, ObjectId)>,
    },

    /// Query seed or operation target is not registered
    #[error("unknown node: {0}")]
    UnknownNode(NodeRef),

    /// Argument outside its accepted domain
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Storage layer failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl LineageError {
    /// Whether re-running the enclosing transaction may succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, LineageError::Storage(e) if e.is_transient())
    }

    /// Whether the error is a rejected write rather than an infrastructure fault
    #[inline]
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            LineageError::InvalidIdentifier { .. }
                | LineageError::DanglingReference(_)
                | LineageError::CycleRejected { .. }
        )
    }
}

/// Storage layer errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Concurrent commit touched the same nodes; the transaction was not applied
    #[error("serialization failure: {0}")]
    SerializationFailure(String),
}

impl StorageError {
    /// Whether re-running the transaction may succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::SerializationFailure(_))
    }
}

/// How a caller referred to a node that could not be found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRef {
    /// By global id
    Global(GlobalId),
    /// By `(kind, row_id)`
    Row(RowKey),
    /// By surrogate key
    Object(ObjectId),
}

impl std::fmt::Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRef::Global(id) => write!(f, "{id}"),
            NodeRef::Row(key) => write!(f, "{key}"),
            NodeRef::Object(id) => write!(f, "{id}"),
        }
    }
}

/// Result alias for lineage graph operations
pub type Result<T> = std::result::Result<T, LineageError>;
