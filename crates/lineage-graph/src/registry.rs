//! Node identity registry
//!
//! Maps global ids and `(kind, row_id)` pairs to registered nodes. Backed by
//! persistent `im` maps so a whole registry clones in O(1) for snapshots.

use crate::error::{LineageError, Result};
use crate::types::{CommitSeq, GlobalId, Node, NewNode, ObjectId, RowKey, TypeKey, Watermark};

/// Registry of lineage nodes
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    nodes: im::OrdMap<ObjectId, Node>,
    by_global: im::HashMap<GlobalId, ObjectId>,
    by_row: im::HashMap<RowKey, ObjectId>,
    by_type: im::HashMap<TypeKey, im::OrdSet<ObjectId>>,
}

impl NodeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered nodes
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no node is registered
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node by surrogate key
    #[inline]
    pub fn get(&self, id: ObjectId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Whether `id` is registered
    #[inline]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Resolve a node by global id
    pub fn resolve_global(&self, global_id: &GlobalId) -> Option<&Node> {
        self.by_global.get(global_id).and_then(|id| self.nodes.get(id))
    }

    /// Resolve a node by `(kind, row_id)`
    pub fn resolve_row(&self, key: RowKey) -> Option<&Node> {
        self.by_row.get(&key).and_then(|id| self.nodes.get(id))
    }

    /// Check a registration request against existing bindings
    ///
    /// Returns the existing node when the request repeats an earlier
    /// registration, `None` when the request is new.
    ///
    /// # Errors
    /// `InvalidIdentifier` if the global id is bound to a different
    /// `(kind, row_id)`, or the `(kind, row_id)` to a different global id.
    pub fn check(&self, request: &NewNode) -> Result<Option<&Node>> {
        if let Some(existing) = self.resolve_global(&request.global_id) {
            if existing.row_key() == request.row_key() {
                return Ok(Some(existing));
            }
            return Err(LineageError::InvalidIdentifier {
                global_id: request.global_id.to_string(),
                reason: format!("already bound to {}", existing.row_key()),
            });
        }
        if let Some(existing) = self.resolve_row(request.row_key()) {
            return Err(LineageError::InvalidIdentifier {
                global_id: request.global_id.to_string(),
                reason: format!(
                    "{} is already registered as {}",
                    request.row_key(),
                    existing.global_id
                ),
            });
        }
        Ok(None)
    }

    /// Insert a node, replacing any node with the same surrogate key
    pub fn insert(&mut self, node: Node) {
        self.by_global.insert(node.global_id.clone(), node.object_id);
        self.by_row.insert(node.row_key(), node.object_id);
        if let Some(type_key) = node.type_key {
            let mut members = self.by_type.get(&type_key).cloned().unwrap_or_default();
            members.insert(node.object_id);
            self.by_type.insert(type_key, members);
        }
        self.nodes.insert(node.object_id, node);
    }

    /// Remove a node and all of its bindings
    pub fn remove(&mut self, id: ObjectId) -> Option<Node> {
        let node = self.nodes.remove(&id)?;
        self.by_global.remove(&node.global_id);
        self.by_row.remove(&node.row_key());
        if let Some(type_key) = node.type_key {
            if let Some(members) = self.by_type.get_mut(&type_key) {
                members.remove(&id);
                if members.is_empty() {
                    self.by_type.remove(&type_key);
                }
            }
        }
        Some(node)
    }

    /// Record a modification of `id` at `seq`
    pub fn touch(&mut self, id: ObjectId, seq: CommitSeq) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.modified = node.modified.max(seq);
        }
    }

    /// Nodes carrying `type_key`, ordered by surrogate key
    pub fn of_type(&self, type_key: TypeKey) -> impl Iterator<Item = &Node> + '_ {
        self.by_type
            .get(&type_key)
            .into_iter()
            .flat_map(|members| members.iter())
            .filter_map(move |id| self.nodes.get(id))
    }

    /// Change signal for all nodes carrying `type_key`
    pub fn watermark(&self, type_key: TypeKey) -> Watermark {
        self.of_type(type_key).fold(Watermark::default(), |mut mark, node| {
            mark.count += 1;
            mark.max_row_id = mark.max_row_id.max(Some(node.row_id));
            mark.max_modified = mark.max_modified.max(node.modified);
            mark
        })
    }

    /// All registered nodes, ordered by surrogate key
    pub fn iter(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContainerId, NodeKind, RowId};
    use chrono::Utc;

    fn node(id: u64, kind: NodeKind, row: i64, gid: &str, type_key: Option<TypeKey>) -> Node {
        Node {
            object_id: ObjectId(id),
            kind,
            row_id: RowId(row),
            global_id: GlobalId::parse(gid).unwrap(),
            type_key,
            container: ContainerId::new(),
            name: gid.to_string(),
            created: Utc::now(),
            modified: CommitSeq(1),
        }
    }

    #[test]
    fn same_row_id_in_different_kinds_are_distinct() {
        let mut registry = NodeRegistry::new();
        registry.insert(node(1, NodeKind::Sample, 5, "s5", None));
        registry.insert(node(2, NodeKind::Data, 5, "d5", None));

        let sample = registry.resolve_row(RowKey::new(NodeKind::Sample, 5)).unwrap();
        let data = registry.resolve_row(RowKey::new(NodeKind::Data, 5)).unwrap();
        assert_ne!(sample.object_id, data.object_id);
    }

    #[test]
    fn conflicting_binding_is_rejected() {
        let mut registry = NodeRegistry::new();
        registry.insert(node(1, NodeKind::Sample, 5, "s5", None));

        let same = NewNode::new(
            NodeKind::Sample,
            5,
            GlobalId::parse("s5").unwrap(),
            ContainerId::new(),
            "s5",
        );
        assert_eq!(registry.check(&same).unwrap().unwrap().object_id, ObjectId(1));

        let other_row = NewNode::new(
            NodeKind::Sample,
            6,
            GlobalId::parse("s5").unwrap(),
            ContainerId::new(),
            "s5",
        );
        assert!(matches!(
            registry.check(&other_row),
            Err(LineageError::InvalidIdentifier { .. })
        ));

        let other_gid = NewNode::new(
            NodeKind::Sample,
            5,
            GlobalId::parse("s5-bis").unwrap(),
            ContainerId::new(),
            "s5",
        );
        assert!(registry.check(&other_gid).is_err());
    }

    #[test]
    fn watermark_tracks_type_membership() {
        let mut registry = NodeRegistry::new();
        let key = TypeKey::SampleType(7);
        assert_eq!(registry.watermark(key), Watermark::default());

        registry.insert(node(1, NodeKind::Sample, 10, "a", Some(key)));
        registry.insert(node(2, NodeKind::Sample, 11, "b", Some(key)));
        let before = registry.watermark(key);
        assert_eq!(before.count, 2);
        assert_eq!(before.max_row_id, Some(RowId(11)));

        registry.touch(ObjectId(1), CommitSeq(9));
        assert_eq!(registry.watermark(key).max_modified, CommitSeq(9));

        registry.remove(ObjectId(2));
        assert_eq!(registry.watermark(key).count, 1);
        assert!(registry.resolve_global(&GlobalId::parse("b").unwrap()).is_none());
    }
}
