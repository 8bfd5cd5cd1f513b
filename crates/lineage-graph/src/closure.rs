//! Transitive ancestor / descendant traversal
//!
//! Iterative breadth-first expansion from a union-seeded frontier. Each node
//! is recorded once, at the minimum depth it was reached from any seed. Each
//! frontier entry carries the path that led to it, and a branch that would
//! re-enter a node on its own path is dropped, so traversal terminates even
//! over cyclic data that bypassed write-time validation. The absolute
//! traversal ceiling bounds depth regardless of what the caller asked for.

use crate::source::GraphSource;
use crate::types::{Edge, EdgeId, ObjectId};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashSet, VecDeque};

/// Absolute hop limit applied to every traversal
pub const DEFAULT_TRAVERSAL_CEILING: u32 = 100;

/// Direction of a traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Follow edges towards inputs (ancestors)
    Parents,
    /// Follow edges towards outputs (descendants)
    Children,
}

/// Traversal bounds and edge selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalOptions {
    /// Requested hop limit, `None` for unbounded
    pub depth: Option<u32>,
    /// Absolute hop limit
    pub ceiling: u32,
    /// Only follow edges asserted under this key
    pub source_key: Option<String>,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            depth: None,
            ceiling: DEFAULT_TRAVERSAL_CEILING,
            source_key: None,
        }
    }
}

impl TraversalOptions {
    /// Unbounded traversal under the default ceiling
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit to `depth` hops
    #[inline]
    #[must_use]
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    /// Override the absolute ceiling
    #[inline]
    #[must_use]
    pub fn with_ceiling(mut self, ceiling: u32) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// Follow only edges carrying `source_key`
    #[inline]
    #[must_use]
    pub fn with_source_key(mut self, source_key: impl Into<String>) -> Self {
        self.source_key = Some(source_key.into());
        self
    }

    /// Effective hop limit and whether it is the ceiling
    fn limit(&self) -> (u32, bool) {
        match self.depth {
            Some(depth) if depth < self.ceiling => (depth, false),
            _ => (self.ceiling, true),
        }
    }

    fn follows(&self, edge: &Edge) -> bool {
        self.source_key
            .as_deref()
            .map_or(true, |key| edge.source_key.as_deref() == Some(key))
    }
}

/// A node reached by a traversal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reached {
    /// Reached node
    pub node: ObjectId,
    /// Minimum hop count from any seed
    pub depth: u32,
    /// Role of the edge it was first reached through
    pub role: String,
    /// Run annotation of that edge
    pub run: Option<ObjectId>,
    /// Node it was first reached from
    pub via: ObjectId,
}

/// An edge crossed during traversal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversedEdge {
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
    /// Depth of the far end from the seeds
    pub depth: u32,
}

/// Result of one directional traversal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Closure {
    /// Seeds the traversal started from, excluded from `reached`
    pub seeds: Vec<ObjectId>,
    /// Reachable nodes keyed by id
    pub reached: BTreeMap<ObjectId, Reached>,
    /// Every edge crossed, ordered by discovery
    pub edges: Vec<TraversedEdge>,
    /// Runs annotated on crossed edges, at the minimum depth seen
    pub runs: BTreeMap<ObjectId, u32>,
    /// The ceiling cut off further expansion
    pub truncated: bool,
    /// Branches dropped because they re-entered their own path
    pub cycles_skipped: usize,
}

impl Closure {
    /// Whether `id` was reached
    #[inline]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.reached.contains_key(&id)
    }

    /// Minimum depth of `id`, if reached
    #[inline]
    pub fn depth_of(&self, id: ObjectId) -> Option<u32> {
        self.reached.get(&id).map(|r| r.depth)
    }
}

type Path = SmallVec<[ObjectId; 16]>;

/// Compute the closure of `seeds` in `direction`
///
/// Seeds that are not in `graph` still occupy depth 0 but have no edges.
pub fn traverse(
    graph: &dyn GraphSource,
    seeds: &[ObjectId],
    direction: Direction,
    options: &TraversalOptions,
) -> Closure {
    let (limit, at_ceiling) = options.limit();
    let mut closure = Closure {
        seeds: seeds.to_vec(),
        ..Closure::default()
    };
    let seed_set: HashSet<ObjectId> = seeds.iter().copied().collect();
    let mut crossed: HashSet<EdgeId> = HashSet::new();
    let mut frontier: VecDeque<(ObjectId, u32, Path)> = seed_set
        .iter()
        .map(|&seed| (seed, 0, SmallVec::from_elem(seed, 1)))
        .collect();

    while let Some((node, depth, path)) = frontier.pop_front() {
        if depth >= limit {
            // Only a neighbour not yet seen was actually cut off
            if at_ceiling
                && neighbors(graph, node, direction, options)
                    .iter()
                    .any(|&(_, next)| {
                        !seed_set.contains(&next)
                            && !closure.reached.contains_key(&next)
                            && !path.contains(&next)
                    })
            {
                closure.truncated = true;
            }
            continue;
        }

        let next_depth = depth + 1;
        for (edge, next) in neighbors(graph, node, direction, options) {
            if path.contains(&next) {
                tracing::warn!("Cycle at {} via {}, branch dropped", next, node);
                closure.cycles_skipped += 1;
                continue;
            }

            if crossed.insert(edge.id) {
                closure.edges.push(TraversedEdge {
                    id: edge.id,
                    from: edge.from,
                    to: edge.to,
                    role: edge.role.clone(),
                    run: edge.run,
                    depth: next_depth,
                });
            }
            if let Some(run) = edge.run {
                let seen = closure.runs.entry(run).or_insert(next_depth);
                *seen = (*seen).min(next_depth);
            }

            if seed_set.contains(&next) || closure.reached.contains_key(&next) {
                continue;
            }
            closure.reached.insert(
                next,
                Reached {
                    node: next,
                    depth: next_depth,
                    role: edge.role.clone(),
                    run: edge.run,
                    via: node,
                },
            );
            let mut next_path = path.clone();
            next_path.push(next);
            frontier.push_back((next, next_depth, next_path));
        }
    }

    if closure.truncated {
        tracing::debug!(
            "Traversal from {} seed(s) truncated at depth {}",
            seeds.len(),
            limit
        );
    }
    closure
}

fn neighbors<'g>(
    graph: &'g dyn GraphSource,
    node: ObjectId,
    direction: Direction,
    options: &TraversalOptions,
) -> Vec<(&'g Edge, ObjectId)> {
    let edges = match direction {
        Direction::Parents => graph.edges_to(node),
        Direction::Children => graph.edges_from(node),
    };
    edges
        .into_iter()
        .filter(|edge| options.follows(edge))
        .map(|edge| match direction {
            Direction::Parents => (edge, edge.from),
            Direction::Children => (edge, edge.to),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::GraphState;
    use crate::types::{CommitSeq, GlobalId, Node, RowKey, TypeKey, Watermark};
    use std::collections::HashMap;

    /// Edge list with no registry, enough to drive traversal
    #[derive(Default)]
    struct EdgeList {
        edges: Vec<Edge>,
        by_from: HashMap<ObjectId, Vec<usize>>,
        by_to: HashMap<ObjectId, Vec<usize>>,
    }

    impl EdgeList {
        fn new(pairs: &[(u64, u64)]) -> Self {
            let mut list = Self::default();
            for (i, &(from, to)) in pairs.iter().enumerate() {
                list.edges.push(Edge {
                    id: EdgeId(i as u64),
                    from: ObjectId(from),
                    to: ObjectId(to),
                    role: format!("r{from}"),
                    property_id: None,
                    run: None,
                    source_id: None,
                    source_key: None,
                });
                list.by_from.entry(ObjectId(from)).or_default().push(i);
                list.by_to.entry(ObjectId(to)).or_default().push(i);
            }
            list
        }

        fn collect(&self, index: &HashMap<ObjectId, Vec<usize>>, id: ObjectId) -> Vec<&Edge> {
            index
                .get(&id)
                .map(|ids| ids.iter().map(|&i| &self.edges[i]).collect())
                .unwrap_or_default()
        }
    }

    impl GraphSource for EdgeList {
        fn node(&self, _: ObjectId) -> Option<&Node> {
            None
        }
        fn resolve_global(&self, _: &GlobalId) -> Option<&Node> {
            None
        }
        fn resolve_row(&self, _: RowKey) -> Option<&Node> {
            None
        }
        fn edges_from(&self, id: ObjectId) -> Vec<&Edge> {
            self.collect(&self.by_from, id)
        }
        fn edges_to(&self, id: ObjectId) -> Vec<&Edge> {
            self.collect(&self.by_to, id)
        }
        fn nodes_of_type(&self, _: TypeKey) -> Vec<&Node> {
            Vec::new()
        }
        fn all_edges(&self) -> Vec<&Edge> {
            self.edges.iter().collect()
        }
        fn watermark(&self, _: TypeKey) -> Watermark {
            Watermark::default()
        }
        fn seq(&self) -> CommitSeq {
            CommitSeq::default()
        }
    }

    fn ids(closure: &Closure) -> Vec<u64> {
        closure.reached.keys().map(|id| id.0).collect()
    }

    #[test]
    fn keeps_minimum_depth() {
        // 1 -> 2 -> 3 -> 4 and 1 -> 4
        let graph = EdgeList::new(&[(1, 2), (2, 3), (3, 4), (1, 4)]);
        let closure = traverse(
            &graph,
            &[ObjectId(1)],
            Direction::Children,
            &TraversalOptions::new(),
        );
        assert_eq!(ids(&closure), vec![2, 3, 4]);
        assert_eq!(closure.depth_of(ObjectId(4)), Some(1));
        assert!(!closure.truncated);
    }

    #[test]
    fn seeds_are_excluded_and_union_seeded() {
        let graph = EdgeList::new(&[(1, 3), (2, 3), (3, 4), (1, 2)]);
        let closure = traverse(
            &graph,
            &[ObjectId(4), ObjectId(2)],
            Direction::Parents,
            &TraversalOptions::new(),
        );
        assert_eq!(ids(&closure), vec![1, 3]);
        assert_eq!(closure.depth_of(ObjectId(1)), Some(1));
    }

    #[test]
    fn requested_depth_is_not_truncation() {
        let graph = EdgeList::new(&[(1, 2), (2, 3), (3, 4)]);
        let closure = traverse(
            &graph,
            &[ObjectId(1)],
            Direction::Children,
            &TraversalOptions::new().with_depth(2),
        );
        assert_eq!(ids(&closure), vec![2, 3]);
        assert!(!closure.truncated);
    }

    #[test]
    fn ceiling_truncates_silently() {
        let pairs: Vec<(u64, u64)> = (0..10).map(|i| (i, i + 1)).collect();
        let graph = EdgeList::new(&pairs);
        let closure = traverse(
            &graph,
            &[ObjectId(0)],
            Direction::Children,
            &TraversalOptions::new().with_ceiling(4).with_depth(50),
        );
        assert_eq!(closure.reached.len(), 4);
        assert!(closure.truncated);
    }

    #[test]
    fn ceiling_over_already_reached_nodes_is_complete() {
        // 1 -> 2, 1 -> 3, 2 -> 3: everything sits within one hop
        let graph = EdgeList::new(&[(1, 2), (1, 3), (2, 3)]);
        let full = traverse(
            &graph,
            &[ObjectId(1)],
            Direction::Children,
            &TraversalOptions::new(),
        );
        let capped = traverse(
            &graph,
            &[ObjectId(1)],
            Direction::Children,
            &TraversalOptions::new().with_ceiling(1),
        );
        assert_eq!(ids(&capped), ids(&full));
        assert!(!capped.truncated);

        // Back edge into a seed at the ceiling hides nothing either
        let graph = EdgeList::new(&[(1, 2), (2, 1)]);
        let capped = traverse(
            &graph,
            &[ObjectId(1)],
            Direction::Children,
            &TraversalOptions::new().with_ceiling(1),
        );
        assert_eq!(ids(&capped), vec![2]);
        assert!(!capped.truncated);
    }

    #[test]
    fn cyclic_data_terminates() {
        let graph = EdgeList::new(&[(1, 2), (2, 3), (3, 1)]);
        let closure = traverse(
            &graph,
            &[ObjectId(1)],
            Direction::Children,
            &TraversalOptions::new(),
        );
        assert_eq!(ids(&closure), vec![2, 3]);
        assert_eq!(closure.cycles_skipped, 1);
        assert!(!closure.truncated);
    }

    #[test]
    fn source_key_is_compared_literally() {
        let graph = GraphState::default();
        let closure = traverse(
            &graph,
            &[ObjectId(1)],
            Direction::Parents,
            &TraversalOptions::new().with_source_key("x' OR '1'='1"),
        );
        assert!(closure.reached.is_empty());

        let mut list = EdgeList::new(&[(1, 2), (2, 3)]);
        list.edges[0].source_key = Some("import".into());
        let closure = traverse(
            &list,
            &[ObjectId(2)],
            Direction::Parents,
            &TraversalOptions::new().with_source_key("import"),
        );
        assert_eq!(ids(&closure), vec![1]);
        let closure = traverse(
            &list,
            &[ObjectId(3)],
            Direction::Parents,
            &TraversalOptions::new().with_source_key("import"),
        );
        assert!(closure.reached.is_empty());
    }
}
