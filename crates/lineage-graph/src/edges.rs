//! Derivation edge table with forward and reverse adjacency

use crate::types::{Edge, EdgeFilter, EdgeId, ObjectId};

/// Stored edges indexed by both endpoints
#[derive(Debug, Clone, Default)]
pub struct EdgeTable {
    edges: im::OrdMap<EdgeId, Edge>,
    outgoing: im::HashMap<ObjectId, im::OrdSet<EdgeId>>,
    incoming: im::HashMap<ObjectId, im::OrdSet<EdgeId>>,
}

impl EdgeTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored edges
    #[inline]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether the table holds no edge
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Look up an edge
    #[inline]
    pub fn get(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    /// Existing edge with the same endpoints and run, if any
    pub fn find(&self, from: ObjectId, to: ObjectId, run: Option<ObjectId>) -> Option<&Edge> {
        self.edges_from(from).find(|edge| edge.to == to && edge.run == run)
    }

    /// Store an edge
    pub fn insert(&mut self, edge: Edge) {
        Self::link(&mut self.outgoing, edge.from, edge.id);
        Self::link(&mut self.incoming, edge.to, edge.id);
        self.edges.insert(edge.id, edge);
    }

    /// Remove an edge
    pub fn remove(&mut self, id: EdgeId) -> Option<Edge> {
        let edge = self.edges.remove(&id)?;
        Self::unlink(&mut self.outgoing, edge.from, id);
        Self::unlink(&mut self.incoming, edge.to, id);
        Some(edge)
    }

    /// Edges whose input is `id`
    pub fn edges_from(&self, id: ObjectId) -> impl Iterator<Item = &Edge> + '_ {
        self.adjacent(&self.outgoing, id)
    }

    /// Edges whose output is `id`
    pub fn edges_to(&self, id: ObjectId) -> impl Iterator<Item = &Edge> + '_ {
        self.adjacent(&self.incoming, id)
    }

    /// Ids of every edge touching `id`
    pub fn incident(&self, id: ObjectId) -> Vec<EdgeId> {
        let mut ids: Vec<EdgeId> = self
            .edges_from(id)
            .chain(self.edges_to(id))
            .map(|e| e.id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Edges selected by `filter`
    ///
    /// Uses the endpoint indexes when the filter names an endpoint.
    pub fn matching(&self, filter: &EdgeFilter) -> Vec<&Edge> {
        if filter.is_empty() {
            return Vec::new();
        }
        let candidates: Box<dyn Iterator<Item = &Edge> + '_> = match (filter.from, filter.to) {
            (Some(from), _) => Box::new(self.edges_from(from)),
            (None, Some(to)) => Box::new(self.edges_to(to)),
            (None, None) => Box::new(self.edges.values()),
        };
        candidates.filter(|edge| filter.matches(edge)).collect()
    }

    /// All edges ordered by id
    pub fn iter(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.values()
    }

    fn adjacent<'a>(
        &'a self,
        index: &'a im::HashMap<ObjectId, im::OrdSet<EdgeId>>,
        id: ObjectId,
    ) -> impl Iterator<Item = &'a Edge> + 'a {
        index
            .get(&id)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(move |edge_id| self.edges.get(edge_id))
    }

    fn link(index: &mut im::HashMap<ObjectId, im::OrdSet<EdgeId>>, key: ObjectId, id: EdgeId) {
        let mut ids = index.get(&key).cloned().unwrap_or_default();
        ids.insert(id);
        index.insert(key, ids);
    }

    fn unlink(index: &mut im::HashMap<ObjectId, im::OrdSet<EdgeId>>, key: ObjectId, id: EdgeId) {
        if let Some(ids) = index.get_mut(&key) {
            ids.remove(&id);
            if ids.is_empty() {
                index.remove(&key);
            }
        }
    }
}
