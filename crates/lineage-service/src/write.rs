//! Mutating operations
//!
//! Every write runs as one transaction through [`with_retry`], so a
//! derivation (node plus its edges) is applied whole or not at all.

use crate::error::Result;
use crate::retry::with_retry;
use crate::service::LineageService;
use lineage_graph::{
    Edge, EdgeFilter, EdgeId, GraphSource, LineageError, NewEdge, NewNode, Node, NodeKind,
    NodeRef, ObjectId, Transaction, TypeKey,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An input of a derivation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parent {
    /// Input node
    pub node: ObjectId,
    /// Role of the input, defaults to its kind
    pub role: Option<String>,
}

impl Parent {
    /// Input with the default role
    pub fn new(node: ObjectId) -> Self {
        Self { node, role: None }
    }

    /// Input with an explicit role
    pub fn with_role(node: ObjectId, role: impl Into<String>) -> Self {
        Self {
            node,
            role: Some(role.into()),
        }
    }

    fn edge_to(&self, to: ObjectId, run: Option<ObjectId>) -> NewEdge {
        let mut edge = NewEdge::new(self.node, to);
        if let Some(role) = &self.role {
            edge = edge.with_role(role.clone());
        }
        if let Some(run) = run {
            edge = edge.via_run(run);
        }
        edge
    }
}

impl LineageService {
    /// Register a node, or return the one already bound to its identity
    ///
    /// # Errors
    /// `InvalidIdentifier` if the identity is bound to a different node.
    pub fn register_node(&self, node: NewNode) -> Result<Node> {
        self.write(|tx| tx.register(node.clone()))
    }

    /// Register `child` and its derivation edges in one transaction
    ///
    /// # Errors
    /// - `InvalidIdentifier`, `DanglingReference` or `CycleRejected`; nothing
    ///   is committed
    /// - `RetryExhausted` if conflicts outlast the retry budget
    pub fn insert_derived(
        &self,
        child: NewNode,
        parents: &[Parent],
        run: Option<ObjectId>,
    ) -> Result<(Node, Vec<EdgeId>)> {
        self.write(|tx| {
            let node = tx.register(child.clone())?;
            let edges = tx.add_edges(
                parents
                    .iter()
                    .map(|p| p.edge_to(node.object_id, run))
                    .collect(),
            )?;
            Ok((node, edges))
        })
    }

    /// Add a batch of edges, checked for cycles as one unit
    ///
    /// # Errors
    /// `DanglingReference`, `CycleRejected` or `InvalidArgument`; no edge of
    /// the batch is committed.
    pub fn add_edges(&self, edges: Vec<NewEdge>) -> Result<Vec<EdgeId>> {
        self.write(|tx| tx.add_edges(edges.clone()))
    }

    /// Committed edges selected by `filter`; an empty filter selects nothing
    pub fn edges(&self, filter: &EdgeFilter) -> Vec<Edge> {
        let snapshot = self.store.snapshot();
        snapshot
            .edges()
            .matching(filter)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Remove the edges selected by `filter`
    ///
    /// # Errors
    /// `RetryExhausted` if conflicts outlast the retry budget.
    pub fn remove_edges(&self, filter: &EdgeFilter) -> Result<usize> {
        self.write(|tx| Ok(tx.remove_edges(filter)))
    }

    /// Replace the edges annotated with `run` by `inputs x outputs`
    ///
    /// Returns the number of edges the run now carries.
    ///
    /// # Errors
    /// - `UnknownNode` if `run` is not registered
    /// - `InvalidArgument` if `run` is not a run
    /// - `DanglingReference` or `CycleRejected` for the new edges; the old
    ///   edges are kept
    pub fn sync_run_edges(
        &self,
        run: ObjectId,
        inputs: &[Parent],
        outputs: &[ObjectId],
    ) -> Result<usize> {
        let (count, affected) = self.write(|tx| {
            let node = tx
                .node(run)
                .ok_or(LineageError::UnknownNode(NodeRef::Object(run)))?;
            if node.kind != NodeKind::Run {
                return Err(LineageError::InvalidArgument(format!(
                    "{} is not a run",
                    node.global_id
                )));
            }

            let filter = EdgeFilter::new().run(run);
            let mut touched: BTreeSet<ObjectId> =
                tx.edges(&filter).iter().map(|e| e.to).collect();
            let removed = tx.remove_edges(&filter);

            let requests: Vec<NewEdge> = outputs
                .iter()
                .flat_map(|&output| {
                    inputs
                        .iter()
                        .map(move |input| input.edge_to(output, Some(run)))
                })
                .collect();
            touched.extend(outputs.iter().copied());
            let mut distinct = tx.add_edges(requests)?;
            distinct.sort_unstable();
            distinct.dedup();

            tracing::info!(
                "Synchronised run {}: {} edge(s) replaced by {}",
                node_label(&*tx, run),
                removed,
                distinct.len()
            );
            Ok((distinct.len(), type_keys(&*tx, &touched)))
        })?;
        self.invalidate_types(&affected);
        Ok(count)
    }

    /// Delete a node and every edge touching it
    ///
    /// # Errors
    /// `UnknownNode` if `id` is not registered.
    pub fn delete_node(&self, id: ObjectId) -> Result<Node> {
        let (node, affected) = self.write(|tx| {
            let mut touched: BTreeSet<ObjectId> =
                tx.edges_from(id).iter().map(|e| e.to).collect();
            touched.insert(id);
            let affected = type_keys(&*tx, &touched);
            let node = tx.delete_node(id)?;
            Ok((node, affected))
        })?;
        self.invalidate_types(&affected);
        Ok(node)
    }

    /// Check the committed graph for cycles that bypassed write-time checks
    ///
    /// # Errors
    /// `CycleRejected` naming the implicated edges.
    pub fn validate_graph(&self) -> Result<()> {
        let snapshot = self.store.snapshot();
        lineage_graph::validate_graph(&snapshot)?;
        Ok(())
    }

    fn write<T>(
        &self,
        f: impl FnMut(&mut Transaction<'_>) -> lineage_graph::Result<T>,
    ) -> Result<T> {
        with_retry(&self.store, &self.config.retry, &self.writes, f)
    }

    fn invalidate_types(&self, types: &BTreeSet<TypeKey>) {
        for &type_key in types {
            self.cache.invalidate(type_key);
        }
    }
}

fn type_keys(graph: &dyn GraphSource, ids: &BTreeSet<ObjectId>) -> BTreeSet<TypeKey> {
    ids.iter()
        .filter_map(|&id| graph.node(id).and_then(|n| n.type_key))
        .collect()
}

fn node_label(graph: &dyn GraphSource, id: ObjectId) -> String {
    graph
        .node(id)
        .map_or_else(|| id.to_string(), |n| n.global_id.to_string())
}
