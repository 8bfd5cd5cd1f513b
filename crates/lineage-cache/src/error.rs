//! Error types for the closure cache

use lineage_graph::TypeKey;

/// Closure cache errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// Ancestor closures are only materialized for sample types and data classes
    #[error("closures are not materialized for source type {0}")]
    UnsupportedSource(TypeKey),
}
