//! Lineage query options

use lineage_graph::{ContainerId, Direction, Node, NodeKind, TypeKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which side of the seeds to explore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LineageDirection {
    /// Ancestors only
    Parents,
    /// Descendants only
    Children,
    /// Ancestors and descendants
    #[default]
    Both,
}

impl LineageDirection {
    /// Traversal directions this covers
    #[must_use]
    pub fn directions(self) -> &'static [Direction] {
        match self {
            LineageDirection::Parents => &[Direction::Parents],
            LineageDirection::Children => &[Direction::Children],
            LineageDirection::Both => &[Direction::Parents, Direction::Children],
        }
    }
}

/// Requested traversal depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Depth {
    /// At most this many hops
    Bounded(u32),
    /// Up to the traversal ceiling
    #[default]
    Unbounded,
}

/// Keeps nodes of the listed kinds and sub-kinds; an empty set allows all
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeFilter {
    /// Allowed node kinds
    pub kinds: BTreeSet<NodeKind>,
    /// Allowed sub-kinds
    pub type_keys: BTreeSet<TypeKey>,
}

impl TypeFilter {
    /// Allow only `kinds`
    pub fn kinds(kinds: impl IntoIterator<Item = NodeKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
            type_keys: BTreeSet::new(),
        }
    }

    /// Allow only nodes carrying one of `type_keys`
    pub fn type_keys(type_keys: impl IntoIterator<Item = TypeKey>) -> Self {
        Self {
            kinds: BTreeSet::new(),
            type_keys: type_keys.into_iter().collect(),
        }
    }

    /// Whether `node` passes
    pub fn allows(&self, node: &Node) -> bool {
        (self.kinds.is_empty() || self.kinds.contains(&node.kind))
            && (self.type_keys.is_empty()
                || node.type_key.is_some_and(|t| self.type_keys.contains(&t)))
    }
}

/// Containers whose nodes may appear in a result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerScope {
    /// Every container
    #[default]
    All,
    /// Only these containers
    Only(BTreeSet<ContainerId>),
}

impl ContainerScope {
    /// Whether `container` is in scope
    pub fn contains(&self, container: ContainerId) -> bool {
        match self {
            ContainerScope::All => true,
            ContainerScope::Only(set) => set.contains(&container),
        }
    }
}

/// Options of a lineage query
///
/// Type and container filters are applied after traversal, so filtered-out
/// nodes still connect the nodes that pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageOptions {
    /// Side of the seeds to explore
    pub direction: LineageDirection,
    /// Hop limit
    pub depth: Depth,
    /// Node kind / sub-kind filter
    pub type_filter: Option<TypeFilter>,
    /// Container scope
    pub containers: ContainerScope,
    /// Report the seeds themselves at depth 0
    pub include_seeds: bool,
    /// Populate the crossed-edge list
    pub include_edges: bool,
    /// Only follow edges asserted under this key
    pub source_key: Option<String>,
}

impl LineageOptions {
    /// Both directions, unbounded, unfiltered
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ancestors only
    #[inline]
    #[must_use]
    pub fn parents() -> Self {
        Self::default().with_direction(LineageDirection::Parents)
    }

    /// Descendants only
    #[inline]
    #[must_use]
    pub fn children() -> Self {
        Self::default().with_direction(LineageDirection::Children)
    }

    /// With direction
    #[inline]
    #[must_use]
    pub fn with_direction(mut self, direction: LineageDirection) -> Self {
        self.direction = direction;
        self
    }

    /// With hop limit
    #[inline]
    #[must_use]
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = Depth::Bounded(depth);
        self
    }

    /// With type filter
    #[inline]
    #[must_use]
    pub fn with_type_filter(mut self, filter: TypeFilter) -> Self {
        self.type_filter = Some(filter);
        self
    }

    /// Restrict results to `containers`
    #[must_use]
    pub fn in_containers(mut self, containers: impl IntoIterator<Item = ContainerId>) -> Self {
        self.containers = ContainerScope::Only(containers.into_iter().collect());
        self
    }

    /// Report seeds at depth 0
    #[inline]
    #[must_use]
    pub fn with_seeds(mut self) -> Self {
        self.include_seeds = true;
        self
    }

    /// Populate edge detail
    #[inline]
    #[must_use]
    pub fn with_edges(mut self) -> Self {
        self.include_edges = true;
        self
    }

    /// Follow only edges asserted under `key`
    #[inline]
    #[must_use]
    pub fn with_source_key(mut self, key: impl Into<String>) -> Self {
        self.source_key = Some(key.into());
        self
    }

    /// Whether `node` passes the type and container filters
    pub fn admits(&self, node: &Node) -> bool {
        self.containers.contains(node.container)
            && self.type_filter.as_ref().map_or(true, |f| f.allows(node))
    }
}
