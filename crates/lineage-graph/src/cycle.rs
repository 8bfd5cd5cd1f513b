//! Cycle detection over derivation edges
//!
//! Uses Kahn's algorithm: compute in-degrees, repeatedly remove nodes whose
//! in-degree is zero, and report whatever remains. The remaining nodes are a
//! superset of the nodes on cycles (nodes downstream of a cycle also never
//! reach in-degree zero), so the reported edges are "implicated", not a
//! minimal cycle.

use crate::error::{LineageError, Result};
use crate::source::GraphSource;
use crate::types::ObjectId;
use petgraph::graphmap::{DiGraphMap, NodeTrait};
use petgraph::Direction;
use std::collections::{HashMap, HashSet, VecDeque};

/// Whether `edges` contain a directed cycle
pub fn has_cycle<N: NodeTrait>(edges: &[(N, N)]) -> bool {
    !detect_cycle(edges).is_empty()
}

/// Edges implicated in a directed cycle, empty if `edges` are acyclic
pub fn detect_cycle<N: NodeTrait>(edges: &[(N, N)]) -> Vec<(N, N)> {
    let graph: DiGraphMap<N, ()> = DiGraphMap::from_edges(edges.iter().copied());
    let remaining = kahn_remaining(&graph);
    if remaining.is_empty() {
        return Vec::new();
    }

    let mut implicated: Vec<(N, N)> = graph
        .all_edges()
        .filter(|(a, b, _)| remaining.contains(a) && remaining.contains(b))
        .map(|(a, b, _)| (a, b))
        .collect();
    implicated.sort();
    implicated
}

fn kahn_remaining<N: NodeTrait>(graph: &DiGraphMap<N, ()>) -> HashSet<N> {
    let mut in_degree: HashMap<N, usize> = graph
        .nodes()
        .map(|n| (n, graph.neighbors_directed(n, Direction::Incoming).count()))
        .collect();

    let mut queue: VecDeque<N> = in_degree
        .iter()
        .filter(|&(_, &deg)| deg == 0)
        .map(|(&n, _)| n)
        .collect();

    while let Some(node) = queue.pop_front() {
        in_degree.remove(&node);
        for succ in graph.neighbors_directed(node, Direction::Outgoing) {
            if let Some(deg) = in_degree.get_mut(&succ) {
                *deg = deg.saturating_sub(1);
                if *deg == 0 {
                    queue.push_back(succ);
                }
            }
        }
    }

    in_degree.into_keys().collect()
}

/// Check that adding `candidates` to `graph` keeps it acyclic
///
/// Only the region reachable from the candidates' targets can hold a new
/// cycle, so the check runs Kahn's algorithm over that region plus the
/// candidates. Returns the nodes examined.
///
/// # Errors
/// `CycleRejected` with the implicated edges.
pub fn check_new_edges(
    graph: &dyn GraphSource,
    candidates: &[(ObjectId, ObjectId)],
) -> Result<HashSet<ObjectId>> {
    let mut added: HashMap<ObjectId, Vec<ObjectId>> = HashMap::new();
    for &(from, to) in candidates {
        added.entry(from).or_default().push(to);
    }

    let mut region: Vec<(ObjectId, ObjectId)> = candidates.to_vec();
    let mut examined: HashSet<ObjectId> = candidates.iter().map(|&(_, to)| to).collect();
    let mut queue: VecDeque<ObjectId> = examined.iter().copied().collect();

    while let Some(node) = queue.pop_front() {
        let stored = graph.edges_from(node).into_iter().map(|e| e.to);
        let pending = added.get(&node).into_iter().flatten().copied();
        for succ in stored.chain(pending) {
            region.push((node, succ));
            if examined.insert(succ) {
                queue.push_back(succ);
            }
        }
    }

    let implicated = detect_cycle(&region);
    if implicated.is_empty() {
        Ok(examined)
    } else {
        tracing::warn!(
            "Rejecting {} candidate edge(s): {} edge(s) implicated in a cycle",
            candidates.len(),
            implicated.len()
        );
        Err(LineageError::CycleRejected { edges: implicated })
    }
}

/// Check the whole stored graph for cycles
///
/// # Errors
/// `CycleRejected` with the implicated edges.
pub fn validate_graph(graph: &dyn GraphSource) -> Result<()> {
    let edges: Vec<(ObjectId, ObjectId)> = graph
        .all_edges()
        .into_iter()
        .map(|e| (e.from, e.to))
        .collect();
    let implicated = detect_cycle(&edges);
    if implicated.is_empty() {
        Ok(())
    } else {
        Err(LineageError::CycleRejected { edges: implicated })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_dag_has_no_cycle() {
        let edges = [("a", "b"), ("b", "c"), ("c", "e"), ("d", "e")];
        assert!(detect_cycle(&edges).is_empty());
        assert!(!has_cycle(&edges));
    }

    #[test]
    fn closing_edge_is_detected() {
        let edges = [("a", "b"), ("b", "c"), ("c", "e"), ("d", "e"), ("e", "a")];
        let implicated = detect_cycle(&edges);
        assert!(!implicated.is_empty());
        assert!(implicated.contains(&("e", "a")));
        assert!(!implicated.contains(&("d", "e")));
    }

    #[test]
    fn self_loop_is_a_cycle() {
        assert_eq!(detect_cycle(&[(1u64, 1u64)]), vec![(1, 1)]);
    }

    #[test]
    fn empty_edge_set_is_acyclic() {
        let edges: [(u64, u64); 0] = [];
        assert!(!has_cycle(&edges));
    }
}
