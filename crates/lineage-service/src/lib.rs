//! Lineage Service - projection API and write path
//!
//! Ties the graph store and the closure cache together:
//! - `get_lineage` projections with direction, depth, type and container
//!   filters
//! - Nearest-ancestor lookups answered from materialized closures
//! - Transactional writes re-run on serialization failures
//! - Run-edge synchronisation and cascading deletes
//!
//! # Example
//!
//! ```rust,ignore
//! use lineage_service::prelude::*;
//!
//! let service = LineageService::new(LineageConfig::default())?;
//! let result = service.get_lineage(
//!     &[GlobalId::parse("mike")?],
//!     &LineageOptions::parents().with_depth(2),
//! )?;
//! for data in result.datas() {
//!     println!("{}", data.name);
//! }
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod options;
pub mod result;
pub mod retry;
pub mod service;
pub mod write;

pub use config::{CacheConfig, LineageConfig, RetryPolicy};
pub use error::{Result, ServiceError};
pub use options::{ContainerScope, Depth, LineageDirection, LineageOptions, TypeFilter};
pub use result::{EdgeDetail, LineageEdge, LineageEntry, LineageResult};
pub use retry::{with_retry, WriteCounts, WriteStats};
pub use service::LineageService;
pub use write::Parent;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for lineage service users
    pub use crate::{
        LineageConfig, LineageDirection, LineageOptions, LineageResult, LineageService, Parent,
        ServiceError, TypeFilter,
    };
    pub use lineage_cache::AncestorLookup;
    pub use lineage_graph::prelude::*;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
