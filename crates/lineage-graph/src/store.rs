//! In-memory transactional lineage store
//!
//! The committed graph lives behind a single `RwLock`. Readers take an O(1)
//! clone of it ([`GraphState`] is built from persistent maps), so a reader
//! never observes a half-applied transaction.
//!
//! Writers run optimistically: a [`Transaction`] works on its own copy and
//! records a mutation log. At commit the store checks that no node the
//! transaction read or wrote was changed by a commit made after it began,
//! then replays the log onto the current graph. A conflict surfaces as
//! [`StorageError::SerializationFailure`] and the caller re-runs the whole
//! transaction.

use crate::cycle;
use crate::edges::EdgeTable;
use crate::error::{LineageError, NodeRef, Result, StorageError};
use crate::registry::NodeRegistry;
use crate::source::GraphSource;
use crate::types::{
    truncate_role, CommitSeq, Edge, EdgeFilter, EdgeId, GlobalId, NewEdge, NewNode, Node,
    NodeKind, ObjectId, RowKey, TypeKey, Watermark, DEFAULT_MAX_ROLE_LEN,
};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// A committed (or transaction-local) version of the graph
#[derive(Debug, Clone, Default)]
pub struct GraphState {
    registry: NodeRegistry,
    edges: EdgeTable,
    // Last commit that wrote each node, kept after deletion
    versions: im::HashMap<ObjectId, CommitSeq>,
    seq: CommitSeq,
}

impl GraphState {
    /// Registered nodes
    #[inline]
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Stored edges
    #[inline]
    pub fn edges(&self) -> &EdgeTable {
        &self.edges
    }

    fn version(&self, id: ObjectId) -> CommitSeq {
        self.versions.get(&id).copied().unwrap_or_default()
    }

    fn bump(&mut self, id: ObjectId, seq: CommitSeq) {
        self.versions.insert(id, seq);
    }

    fn apply(&mut self, mutation: &Mutation, seq: CommitSeq) {
        match mutation {
            Mutation::InsertNode(node) => {
                let mut node = node.clone();
                node.modified = seq;
                self.bump(node.object_id, seq);
                self.registry.insert(node);
            }
            Mutation::InsertEdge(edge) => {
                self.bump(edge.from, seq);
                self.bump(edge.to, seq);
                self.edges.insert(edge.clone());
                self.stamp_downstream(edge.to, seq);
            }
            Mutation::RemoveEdge(id) => self.drop_edge(*id, seq),
            Mutation::RemoveNode(id) => {
                for edge_id in self.edges.incident(*id) {
                    self.drop_edge(edge_id, seq);
                }
                self.registry.remove(*id);
                self.bump(*id, seq);
            }
        }
    }

    fn drop_edge(&mut self, id: EdgeId, seq: CommitSeq) {
        if let Some(edge) = self.edges.remove(id) {
            self.bump(edge.from, seq);
            self.bump(edge.to, seq);
            self.stamp_downstream(edge.to, seq);
        }
    }

    // The ancestor set of `start` and every node below it just changed
    fn stamp_downstream(&mut self, start: ObjectId, seq: CommitSeq) {
        let mut seen = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(id) = queue.pop_front() {
            self.registry.touch(id, seq);
            for edge in self.edges.edges_from(id) {
                if seen.insert(edge.to) {
                    queue.push_back(edge.to);
                }
            }
        }
    }
}

impl GraphSource for GraphState {
    fn node(&self, id: ObjectId) -> Option<&Node> {
        self.registry.get(id)
    }

    fn resolve_global(&self, global_id: &GlobalId) -> Option<&Node> {
        self.registry.resolve_global(global_id)
    }

    fn resolve_row(&self, key: RowKey) -> Option<&Node> {
        self.registry.resolve_row(key)
    }

    fn edges_from(&self, id: ObjectId) -> Vec<&Edge> {
        self.edges.edges_from(id).collect()
    }

    fn edges_to(&self, id: ObjectId) -> Vec<&Edge> {
        self.edges.edges_to(id).collect()
    }

    fn nodes_of_type(&self, type_key: TypeKey) -> Vec<&Node> {
        self.registry.of_type(type_key).collect()
    }

    fn all_edges(&self) -> Vec<&Edge> {
        self.edges.iter().collect()
    }

    fn watermark(&self, type_key: TypeKey) -> Watermark {
        self.registry.watermark(type_key)
    }

    fn seq(&self) -> CommitSeq {
        self.seq
    }
}

#[derive(Debug, Clone)]
enum Mutation {
    InsertNode(Node),
    InsertEdge(Edge),
    RemoveEdge(EdgeId),
    RemoveNode(ObjectId),
}

/// Shared in-memory lineage store
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<GraphState>,
    next_object: AtomicU64,
    next_edge: AtomicU64,
    max_role_len: usize,
    injected_failures: AtomicU32,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::with_max_role_len(DEFAULT_MAX_ROLE_LEN)
    }

    /// Create an empty store truncating edge roles to `max_role_len` characters
    pub fn with_max_role_len(max_role_len: usize) -> Self {
        Self {
            state: RwLock::new(GraphState::default()),
            next_object: AtomicU64::new(1),
            next_edge: AtomicU64::new(1),
            max_role_len,
            injected_failures: AtomicU32::new(0),
        }
    }

    /// Consistent view of the last committed graph
    pub fn snapshot(&self) -> GraphState {
        self.state.read().clone()
    }

    /// Last committed sequence number
    pub fn seq(&self) -> CommitSeq {
        self.state.read().seq
    }

    /// Start a transaction against the current committed graph
    pub fn begin(&self) -> Transaction<'_> {
        let working = self.snapshot();
        Transaction {
            store: self,
            base: working.seq,
            working,
            log: Vec::new(),
            reads: HashSet::new(),
            writes: HashSet::new(),
            claimed: Vec::new(),
        }
    }

    /// Run `f` in a transaction and commit it
    ///
    /// The transaction is abandoned if `f` fails; nothing it did is applied.
    ///
    /// # Errors
    /// Whatever `f` returns, or `SerializationFailure` if the commit
    /// conflicted with a concurrent one.
    pub fn transaction<T>(&self, f: impl FnOnce(&mut Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut tx = self.begin();
        let value = f(&mut tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Make the next `count` commits fail with a serialization failure
    pub fn inject_commit_failures(&self, count: u32) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> bool {
        self.injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn commit(&self, tx: &Transaction<'_>) -> Result<CommitSeq> {
        if self.take_injected_failure() {
            tracing::debug!("Injected commit failure at base {}", tx.base.0);
            return Err(
                StorageError::SerializationFailure("injected commit failure".into()).into(),
            );
        }

        let mut state = self.state.write();
        if let Some(id) = tx
            .reads
            .iter()
            .chain(tx.writes.iter())
            .find(|id| state.version(**id) > tx.base)
        {
            tracing::debug!("Commit conflict on {} (base {})", id, tx.base.0);
            return Err(StorageError::SerializationFailure(format!(
                "{id} changed after transaction start"
            ))
            .into());
        }
        if let Some((global_id, _)) = tx.claimed.iter().find(|(global_id, row)| {
            state.registry.resolve_global(global_id).is_some()
                || state.registry.resolve_row(*row).is_some()
        }) {
            return Err(StorageError::SerializationFailure(format!(
                "{global_id} registered concurrently"
            ))
            .into());
        }

        let seq = state.seq.next();
        for mutation in &tx.log {
            state.apply(mutation, seq);
        }
        state.seq = seq;
        tracing::debug!("Committed {} mutation(s) at seq {}", tx.log.len(), seq.0);
        Ok(seq)
    }
}

/// Unit of atomic change against a [`MemoryStore`]
///
/// Reads inside the transaction see its own writes. Dropping a transaction
/// without committing abandons it.
#[derive(Debug)]
pub struct Transaction<'s> {
    store: &'s MemoryStore,
    base: CommitSeq,
    working: GraphState,
    log: Vec<Mutation>,
    reads: HashSet<ObjectId>,
    writes: HashSet<ObjectId>,
    claimed: Vec<(GlobalId, RowKey)>,
}

impl Transaction<'_> {
    /// Commit sequence the transaction started from
    #[inline]
    pub fn base(&self) -> CommitSeq {
        self.base
    }

    /// Register a node, returning the existing one for a repeated registration
    ///
    /// # Errors
    /// `InvalidIdentifier` if the global id or `(kind, row_id)` is already
    /// bound elsewhere.
    pub fn register(&mut self, request: NewNode) -> Result<Node> {
        let existing = self.working.registry.check(&request)?.cloned();
        if let Some(existing) = existing {
            self.reads.insert(existing.object_id);
            return Ok(existing);
        }

        let node = Node {
            object_id: ObjectId(self.store.next_object.fetch_add(1, Ordering::Relaxed)),
            kind: request.kind,
            row_id: request.row_id,
            global_id: request.global_id.clone(),
            type_key: request.type_key,
            container: request.container,
            name: request.name,
            created: Utc::now(),
            modified: self.provisional(),
        };
        self.claimed.push((request.global_id, node.row_key()));
        self.writes.insert(node.object_id);
        self.record(Mutation::InsertNode(node.clone()));
        tracing::debug!("Registered {} as {}", node.global_id, node.object_id);
        Ok(node)
    }

    /// Add one derivation edge
    ///
    /// # Errors
    /// See [`Transaction::add_edges`].
    pub fn add_edge(&mut self, request: NewEdge) -> Result<EdgeId> {
        let ids = self.add_edges(vec![request])?;
        ids.into_iter()
            .next()
            .ok_or_else(|| LineageError::InvalidArgument("no edge created".into()))
    }

    /// Add a batch of derivation edges, checked for cycles as one unit
    ///
    /// An edge repeating an existing `(from, to, run)` returns the existing
    /// id. Ids are returned in request order.
    ///
    /// # Errors
    /// - `DanglingReference` if an endpoint or run is not registered
    /// - `InvalidArgument` if the run annotation is not a run node
    /// - `CycleRejected` if the batch would close a cycle, self-loops included
    pub fn add_edges(&mut self, requests: Vec<NewEdge>) -> Result<Vec<EdgeId>> {
        let mut ids = Vec::with_capacity(requests.len());
        let mut pending: Vec<Edge> = Vec::new();
        let mut batch: HashMap<(ObjectId, ObjectId, Option<ObjectId>), EdgeId> = HashMap::new();

        for request in requests {
            let from_kind = self.require(request.from)?.kind;
            self.require(request.to)?;
            if let Some(run) = request.run {
                if self.require(run)?.kind != NodeKind::Run {
                    return Err(LineageError::InvalidArgument(format!(
                        "{run} is not a run"
                    )));
                }
            }
            if request.from == request.to {
                return Err(LineageError::CycleRejected {
                    edges: vec![(request.from, request.to)],
                });
            }

            let key = (request.from, request.to, request.run);
            if let Some(existing) = self.working.edges.find(key.0, key.1, key.2) {
                ids.push(existing.id);
                continue;
            }
            if let Some(id) = batch.get(&key) {
                ids.push(*id);
                continue;
            }

            let role = request
                .role
                .as_deref()
                .unwrap_or_else(|| from_kind.default_role());
            let edge = Edge {
                id: EdgeId(self.store.next_edge.fetch_add(1, Ordering::Relaxed)),
                from: request.from,
                to: request.to,
                role: truncate_role(role, self.store.max_role_len),
                property_id: request.property_id,
                run: request.run,
                source_id: request.source_id,
                source_key: request.source_key,
            };
            batch.insert(key, edge.id);
            ids.push(edge.id);
            pending.push(edge);
        }

        if pending.is_empty() {
            return Ok(ids);
        }

        let candidates: Vec<(ObjectId, ObjectId)> =
            pending.iter().map(|e| (e.from, e.to)).collect();
        let examined = cycle::check_new_edges(&self.working, &candidates)?;
        self.reads.extend(examined);

        tracing::debug!("Adding {} edge(s)", pending.len());
        for edge in pending {
            self.writes.insert(edge.from);
            self.writes.insert(edge.to);
            self.record(Mutation::InsertEdge(edge));
        }
        Ok(ids)
    }

    /// Edges selected by `filter`; an empty filter selects nothing
    pub fn edges(&self, filter: &EdgeFilter) -> Vec<Edge> {
        self.working
            .edges
            .matching(filter)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Remove the edges selected by `filter`, returning how many were removed
    ///
    /// An empty filter removes nothing.
    pub fn remove_edges(&mut self, filter: &EdgeFilter) -> usize {
        let ids: Vec<EdgeId> = self
            .working
            .edges
            .matching(filter)
            .into_iter()
            .map(|e| e.id)
            .collect();
        self.remove_edge_ids(ids)
    }

    /// Remove every edge touching `id`
    ///
    /// # Errors
    /// `UnknownNode` if `id` is not registered.
    pub fn remove_edges_for_node(&mut self, id: ObjectId) -> Result<usize> {
        self.existing(id)?;
        let ids = self.working.edges.incident(id);
        Ok(self.remove_edge_ids(ids))
    }

    /// Delete a node together with all of its edges
    ///
    /// Deleting a run also removes the edges annotated with it.
    ///
    /// # Errors
    /// `UnknownNode` if `id` is not registered.
    pub fn delete_node(&mut self, id: ObjectId) -> Result<Node> {
        let node = self.existing(id)?.clone();
        let mut removed = self.remove_edges_for_node(id)?;
        if node.kind == NodeKind::Run {
            removed += self.remove_edges(&EdgeFilter::new().run(id));
        }
        self.writes.insert(id);
        self.record(Mutation::RemoveNode(id));
        tracing::debug!("Deleted {} and {} edge(s)", node.global_id, removed);
        Ok(node)
    }

    /// Apply the transaction
    ///
    /// A transaction that changed nothing commits trivially.
    ///
    /// # Errors
    /// `SerializationFailure` if a concurrent commit touched a node this
    /// transaction read or wrote.
    pub fn commit(self) -> Result<CommitSeq> {
        if self.log.is_empty() {
            return Ok(self.base);
        }
        self.store.commit(&self)
    }

    /// Abandon the transaction
    pub fn rollback(self) {
        tracing::debug!("Rolled back {} mutation(s)", self.log.len());
    }

    fn remove_edge_ids(&mut self, ids: Vec<EdgeId>) -> usize {
        let mut removed = 0;
        for id in ids {
            if let Some(edge) = self.working.edges.get(id) {
                self.writes.insert(edge.from);
                self.writes.insert(edge.to);
                self.record(Mutation::RemoveEdge(id));
                removed += 1;
            }
        }
        removed
    }

    fn require(&mut self, id: ObjectId) -> Result<&Node> {
        self.reads.insert(id);
        self.working
            .registry
            .get(id)
            .ok_or(LineageError::DanglingReference(id))
    }

    fn existing(&mut self, id: ObjectId) -> Result<&Node> {
        self.reads.insert(id);
        self.working
            .registry
            .get(id)
            .ok_or(LineageError::UnknownNode(NodeRef::Object(id)))
    }

    fn provisional(&self) -> CommitSeq {
        self.base.next()
    }

    fn record(&mut self, mutation: Mutation) {
        let seq = self.provisional();
        self.working.apply(&mutation, seq);
        self.log.push(mutation);
    }
}

impl GraphSource for Transaction<'_> {
    fn node(&self, id: ObjectId) -> Option<&Node> {
        self.working.node(id)
    }

    fn resolve_global(&self, global_id: &GlobalId) -> Option<&Node> {
        self.working.resolve_global(global_id)
    }

    fn resolve_row(&self, key: RowKey) -> Option<&Node> {
        self.working.resolve_row(key)
    }

    fn edges_from(&self, id: ObjectId) -> Vec<&Edge> {
        self.working.edges_from(id)
    }

    fn edges_to(&self, id: ObjectId) -> Vec<&Edge> {
        self.working.edges_to(id)
    }

    fn nodes_of_type(&self, type_key: TypeKey) -> Vec<&Node> {
        self.working.nodes_of_type(type_key)
    }

    fn all_edges(&self) -> Vec<&Edge> {
        self.working.all_edges()
    }

    fn watermark(&self, type_key: TypeKey) -> Watermark {
        self.working.watermark(type_key)
    }

    fn seq(&self) -> CommitSeq {
        self.base
    }
}
