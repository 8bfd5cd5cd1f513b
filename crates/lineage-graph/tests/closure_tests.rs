use lineage_graph::{traverse, Direction, MemoryStore, NewEdge, ObjectId, TraversalOptions};
use lineage_test_utils::{acyclic_edges, graph_from_edges, layered_dag, samples};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::{HashMap, VecDeque};

fn shortest_distances(n: usize, edges: &[(usize, usize)], from: usize) -> HashMap<usize, u32> {
    let mut dist = HashMap::from([(from, 0)]);
    let mut queue = VecDeque::from([from]);
    while let Some(node) = queue.pop_front() {
        let d = dist[&node];
        for &(a, b) in edges {
            if a == node && b < n && !dist.contains_key(&b) {
                dist.insert(b, d + 1);
                queue.push_back(b);
            }
        }
    }
    dist.remove(&from);
    dist
}

fn build(n: usize, edges: &[(usize, usize)]) -> (MemoryStore, Vec<ObjectId>) {
    let store = MemoryStore::new();
    let ids = samples(&store, n);
    store
        .transaction(|tx| {
            tx.add_edges(
                edges
                    .iter()
                    .map(|&(a, b)| NewEdge::new(ids[a], ids[b]))
                    .collect(),
            )
        })
        .unwrap();
    (store, ids)
}

proptest! {
    #[test]
    fn prop_depth_bound_respected((n, edges) in acyclic_edges(16, 40), depth in 0..5u32) {
        let (store, ids) = build(n, &edges);
        let snapshot = store.snapshot();
        let expected = shortest_distances(n, &edges, 0);

        let closure = traverse(
            &snapshot,
            &[ids[0]],
            Direction::Children,
            &TraversalOptions::new().with_depth(depth),
        );

        for reached in closure.reached.values() {
            prop_assert!(reached.depth <= depth);
        }
        for (idx, d) in expected {
            if d <= depth {
                prop_assert_eq!(closure.depth_of(ids[idx]), Some(d));
            } else {
                prop_assert!(!closure.contains(ids[idx]));
            }
        }
    }

    #[test]
    fn prop_direction_symmetry((n, edges) in acyclic_edges(12, 30)) {
        let (store, ids) = build(n, &edges);
        let snapshot = store.snapshot();
        let one_hop = TraversalOptions::new().with_depth(1);

        for &(a, b) in &edges {
            let children = traverse(&snapshot, &[ids[a]], Direction::Children, &one_hop);
            let parents = traverse(&snapshot, &[ids[b]], Direction::Parents, &one_hop);
            prop_assert_eq!(children.depth_of(ids[b]), Some(1));
            prop_assert_eq!(parents.depth_of(ids[a]), Some(1));
        }
    }
}

#[test]
fn test_minimum_depth_dedup() {
    // x is one hop from s directly and three hops through a, b
    let graph = graph_from_edges(&[("s", "x"), ("s", "a"), ("a", "b"), ("b", "x")]);
    let snapshot = graph.store.snapshot();
    let x = graph.id("x");

    let closure = traverse(
        &snapshot,
        &[graph.id("s")],
        Direction::Children,
        &TraversalOptions::new(),
    );

    assert_eq!(closure.depth_of(x), Some(1));
    assert_eq!(closure.reached.values().filter(|r| r.node == x).count(), 1);
    assert_eq!(closure.edges.len(), 4);

    let ancestors = traverse(&snapshot, &[x], Direction::Parents, &TraversalOptions::new());
    assert_eq!(graph.names(ancestors.reached.keys().copied()), vec!["a", "b", "s"]);
    assert_eq!(ancestors.depth_of(graph.id("s")), Some(1));
}

#[test]
fn test_multiple_seeds_share_one_traversal() {
    let graph = graph_from_edges(&[("p", "a"), ("a", "b"), ("q", "b")]);
    let snapshot = graph.store.snapshot();

    let closure = traverse(
        &snapshot,
        &[graph.id("a"), graph.id("b")],
        Direction::Parents,
        &TraversalOptions::new(),
    );

    assert_eq!(graph.names(closure.reached.keys().copied()), vec!["p", "q"]);
    assert_eq!(closure.depth_of(graph.id("p")), Some(1));
}

#[test]
fn test_deep_chain_hits_ceiling() {
    let store = MemoryStore::new();
    let grid = layered_dag(&store, 30, 2);
    let snapshot = store.snapshot();

    let closure = traverse(
        &snapshot,
        &[grid[29][0]],
        Direction::Parents,
        &TraversalOptions::new().with_ceiling(10),
    );
    assert!(closure.truncated);
    assert!(closure.reached.values().all(|r| r.depth <= 10));

    let full = traverse(&snapshot, &[grid[29][0]], Direction::Parents, &TraversalOptions::new());
    assert!(!full.truncated);
    assert_eq!(full.reached.len(), 29 * 2);
}
