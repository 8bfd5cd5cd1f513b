//! Lineage query results

use lineage_graph::{EdgeId, GlobalId, Node, NodeKind, ObjectId};
use serde::{Deserialize, Serialize};

/// A node in a lineage result
///
/// Depth is signed: negative for ancestors, positive for descendants, zero
/// for seeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageEntry {
    /// The node
    pub node: Node,
    /// Signed minimum hop count
    pub depth: i32,
    /// Role of the edge it was first reached through
    pub role: String,
    /// Run that edge was annotated with
    pub run: Option<ObjectId>,
}

/// An edge crossed while computing a lineage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageEdge {
    /// Stored edge id
    pub id: EdgeId,
    /// Input node
    pub from: ObjectId,
    /// Produced node
    pub to: ObjectId,
    /// Role label
    pub role: String,
    /// Run annotation
    pub run: Option<ObjectId>,
    /// Signed depth of the far end
    pub depth: i32,
}

/// Edge detail of a result, present only when requested
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeDetail {
    /// The query did not ask for edges
    #[default]
    Unpopulated,
    /// Every edge crossed
    Populated(Vec<LineageEdge>),
}

impl EdgeDetail {
    /// Edges, if populated
    pub fn edges(&self) -> Option<&[LineageEdge]> {
        match self {
            EdgeDetail::Unpopulated => None,
            EdgeDetail::Populated(edges) => Some(edges),
        }
    }
}

/// Result of a lineage query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageResult {
    /// Seeds at depth 0, present only when requested
    pub seeds: Vec<LineageEntry>,
    /// Ancestors at their minimum depth
    pub ancestors: Vec<LineageEntry>,
    /// Descendants at their minimum depth
    pub descendants: Vec<LineageEntry>,
    /// Runs annotated on crossed edges
    pub runs: Vec<LineageEntry>,
    /// Crossed edges
    pub edges: EdgeDetail,
    /// The traversal ceiling cut the result short
    pub truncated: bool,
}

impl LineageResult {
    /// Whether neither ancestors, descendants nor runs were found
    pub fn is_empty(&self) -> bool {
        self.ancestors.is_empty() && self.descendants.is_empty() && self.runs.is_empty()
    }

    /// Non-seed nodes of `kind`
    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<&Node> {
        self.ancestors
            .iter()
            .chain(&self.descendants)
            .chain(&self.runs)
            .map(|entry| &entry.node)
            .filter(|node| node.kind == kind)
            .collect()
    }

    /// Data items found
    pub fn datas(&self) -> Vec<&Node> {
        self.nodes_of_kind(NodeKind::Data)
    }

    /// Samples found
    pub fn materials(&self) -> Vec<&Node> {
        self.nodes_of_kind(NodeKind::Sample)
    }

    /// Entry for `global_id` in any section
    pub fn entry(&self, global_id: &GlobalId) -> Option<&LineageEntry> {
        self.seeds
            .iter()
            .chain(&self.ancestors)
            .chain(&self.descendants)
            .chain(&self.runs)
            .find(|entry| &entry.node.global_id == global_id)
    }

    /// Inputs of `id` among the crossed edges, `None` without edge detail
    pub fn node_parents(&self, id: ObjectId) -> Option<Vec<ObjectId>> {
        self.edges
            .edges()
            .map(|edges| edges.iter().filter(|e| e.to == id).map(|e| e.from).collect())
    }

    /// Outputs of `id` among the crossed edges, `None` without edge detail
    pub fn node_children(&self, id: ObjectId) -> Option<Vec<ObjectId>> {
        self.edges
            .edges()
            .map(|edges| edges.iter().filter(|e| e.from == id).map(|e| e.to).collect())
    }
}
