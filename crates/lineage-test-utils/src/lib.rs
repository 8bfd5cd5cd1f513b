//! Testing utilities for the lineage workspace
//!
//! Shared fixtures: named graphs built from literal edge lists, the
//! samples/data derivation scenario, layered DAGs for load tests, and
//! proptest strategies for acyclic edge sets.

#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]

use lineage_graph::{
    ContainerId, GlobalId, MemoryStore, NewEdge, NewNode, Node, NodeKind, ObjectId, Transaction,
    TypeKey,
};
use proptest::prelude::*;
use std::collections::HashMap;

pub const SAMPLE_TYPE: TypeKey = TypeKey::SampleType(1);
pub const DATA_CLASS: TypeKey = TypeKey::DataClass(1);
pub const PROTOCOL: TypeKey = TypeKey::Protocol(1);

pub fn gid(value: &str) -> GlobalId {
    GlobalId::parse(value).unwrap()
}

pub fn sample(row: i64, name: &str, container: ContainerId) -> NewNode {
    NewNode::new(NodeKind::Sample, row, gid(name), container, name).with_type(SAMPLE_TYPE)
}

pub fn data(row: i64, name: &str, container: ContainerId) -> NewNode {
    NewNode::new(NodeKind::Data, row, gid(name), container, name).with_type(DATA_CLASS)
}

pub fn run(row: i64, name: &str, container: ContainerId) -> NewNode {
    NewNode::new(NodeKind::Run, row, gid(name), container, name).with_type(PROTOCOL)
}

/// A store whose nodes are named samples, built from a literal edge list
pub struct NamedGraph {
    pub store: MemoryStore,
    pub container: ContainerId,
    pub ids: HashMap<String, ObjectId>,
}

impl NamedGraph {
    pub fn id(&self, name: &str) -> ObjectId {
        self.ids[name]
    }

    pub fn names(&self, ids: impl IntoIterator<Item = ObjectId>) -> Vec<String> {
        let by_id: HashMap<ObjectId, &str> =
            self.ids.iter().map(|(name, id)| (*id, name.as_str())).collect();
        let mut names: Vec<String> = ids.into_iter().map(|id| by_id[&id].to_string()).collect();
        names.sort();
        names
    }
}

/// Register every endpoint of `edges` as a sample and add the edges
pub fn graph_from_edges(edges: &[(&str, &str)]) -> NamedGraph {
    let store = MemoryStore::new();
    let container = ContainerId::new();
    let ids = store
        .transaction(|tx| {
            let mut ids = HashMap::new();
            for name in edges.iter().flat_map(|(a, b)| [*a, *b]) {
                if !ids.contains_key(name) {
                    let row = i64::try_from(ids.len()).unwrap_or(i64::MAX) + 1;
                    let node = tx.register(sample(row, name, container))?;
                    ids.insert(name.to_string(), node.object_id);
                }
            }
            tx.add_edges(
                edges
                    .iter()
                    .map(|(a, b)| NewEdge::new(ids[*a], ids[*b]))
                    .collect(),
            )?;
            Ok(ids)
        })
        .unwrap();
    NamedGraph {
        store,
        container,
        ids,
    }
}

/// Register `child` and derive it from `parents` through a new run
pub fn derive(
    tx: &mut Transaction<'_>,
    child: NewNode,
    parents: &[&Node],
    run_row: i64,
) -> lineage_graph::Result<Node> {
    let container = child.container;
    let run_name = format!("run-{run_row}");
    let run_node = tx.register(run(run_row, &run_name, container))?;
    let child = tx.register(child)?;
    let edges = parents
        .iter()
        .map(|parent| {
            NewEdge::new(parent.object_id, child.object_id).via_run(run_node.object_id)
        })
        .collect();
    tx.add_edges(edges)?;
    Ok(child)
}

/// Samples S-1 and S-2 with data bob, sally and mike derived from them
///
/// - bob <- S-1
/// - sally <- bob, S-2
/// - mike <- bob, sally, S-1, S-2
pub struct Scenario {
    pub store: MemoryStore,
    pub container: ContainerId,
    pub s1: Node,
    pub s2: Node,
    pub bob: Node,
    pub sally: Node,
    pub mike: Node,
}

impl Scenario {
    pub fn build() -> Self {
        Self::build_in(MemoryStore::new())
    }

    pub fn build_in(store: MemoryStore) -> Self {
        let container = ContainerId::new();
        let (s1, s2) = store
            .transaction(|tx| {
                Ok((
                    tx.register(sample(1, "S-1", container))?,
                    tx.register(sample(2, "S-2", container))?,
                ))
            })
            .unwrap();
        let bob = store
            .transaction(|tx| derive(tx, data(1, "bob", container), &[&s1], 1))
            .unwrap();
        let sally = store
            .transaction(|tx| derive(tx, data(2, "sally", container), &[&bob, &s2], 2))
            .unwrap();
        let mike = store
            .transaction(|tx| {
                derive(
                    tx,
                    data(3, "mike", container),
                    &[&bob, &sally, &s1, &s2],
                    3,
                )
            })
            .unwrap();
        Self {
            store,
            container,
            s1,
            s2,
            bob,
            sally,
            mike,
        }
    }
}

/// `layers` layers of `width` samples; each node has two parents in the layer above
pub fn layered_dag(store: &MemoryStore, layers: usize, width: usize) -> Vec<Vec<ObjectId>> {
    let container = ContainerId::new();
    let mut grid: Vec<Vec<ObjectId>> = Vec::with_capacity(layers);
    let mut row = next_row(store);
    for layer in 0..layers {
        let above = grid.last().cloned();
        let ids = store
            .transaction(|tx| {
                let mut ids = Vec::with_capacity(width);
                let mut edges = Vec::new();
                for i in 0..width {
                    let node = tx.register(sample(row, &format!("L{layer}-{i}"), container))?;
                    if let Some(above) = &above {
                        edges.push(NewEdge::new(above[i], node.object_id));
                        edges.push(NewEdge::new(above[(i + 1) % width], node.object_id));
                    }
                    ids.push(node.object_id);
                    row += 1;
                }
                tx.add_edges(edges)?;
                Ok(ids)
            })
            .unwrap();
        grid.push(ids);
    }
    grid
}

/// Node count and edges `(a, b)` with `a < b`, so always acyclic
pub fn acyclic_edges(
    max_nodes: usize,
    max_edges: usize,
) -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2..=max_nodes).prop_flat_map(move |n| {
        let edges = proptest::collection::vec((0..n, 0..n), 0..=max_edges).prop_map(|pairs| {
            pairs
                .into_iter()
                .filter(|(a, b)| a != b)
                .map(|(a, b)| (a.min(b), a.max(b)))
                .collect::<Vec<_>>()
        });
        (Just(n), edges)
    })
}

/// Register `count` samples in one transaction
pub fn samples(store: &MemoryStore, count: usize) -> Vec<ObjectId> {
    let container = ContainerId::new();
    let first = next_row(store);
    store
        .transaction(|tx| {
            (first..)
                .take(count)
                .map(|row| {
                    tx.register(sample(row, &format!("n{row}"), container))
                        .map(|node| node.object_id)
                })
                .collect()
        })
        .unwrap()
}

// Row ids past everything registered so far, so fixtures compose on one store
fn next_row(store: &MemoryStore) -> i64 {
    i64::try_from(store.snapshot().registry().len()).unwrap_or(0) + 1
}
