//! Error types for the lineage service

use lineage_cache::CacheError;
use lineage_graph::LineageError;

/// Lineage service error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Graph operation failed
    #[error("graph error: {0}")]
    Graph(#[from] LineageError),

    /// Closure cache failed
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Transient failures persisted past the retry budget
    #[error("gave up after {attempts} attempt(s): {last}")]
    RetryExhausted {
        /// Attempts made
        attempts: u32,
        /// Error of the final attempt
        last: LineageError,
    },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    /// Underlying graph error, if any
    #[must_use]
    pub fn graph_error(&self) -> Option<&LineageError> {
        match self {
            ServiceError::Graph(e) | ServiceError::RetryExhausted { last: e, .. } => Some(e),
            _ => None,
        }
    }

    /// Whether the write was refused rather than failing
    #[inline]
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, ServiceError::Graph(e) if e.is_rejection())
    }
}

/// Result alias for service operations
pub type Result<T> = std::result::Result<T, ServiceError>;
