//! K-shortest-paths computation (spec.md §4.B): a Yen-style search producing
//! up to `K` paths per destination, preferring link-disjoint results, tied by
//! total cost, then hop count, then a lexicographic path id.

use std::collections::{BinaryHeap, HashMap, HashSet};

use mesh_common::config::CostWeights;
use mesh_common::ids::{LinkKey, NodeId};

use crate::cost::edge_cost;
use crate::lsa::Lsa;

#[derive(Clone, Debug, PartialEq)]
pub struct Path {
    pub nodes: Vec<NodeId>,
    pub cost: f64,
}

impl Path {
    pub fn links(&self) -> Vec<LinkKey> {
        self.nodes
            .windows(2)
            .map(|w| LinkKey::new(w[0], w[1]))
            .collect()
    }

    pub fn hop_count(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    /// Deterministic tie-break id: the concatenation of node ids along the
    /// path, compared lexicographically (spec.md §4.B: "tie-broken by total
    /// cost, then hop count, then lexicographic path-id").
    pub fn path_id(&self) -> String {
        self.nodes
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(">")
    }

    fn sort_key(&self) -> (u64, usize, String) {
        (self.cost.to_bits(), self.hop_count(), self.path_id())
    }
}

/// Adjacency derived from the LSDB snapshot: `node -> [(neighbor, cost)]`.
pub type Graph = HashMap<NodeId, Vec<(NodeId, f64)>>;

pub fn build_graph(snapshot: &HashMap<NodeId, Lsa>, weights: &CostWeights) -> Graph {
    let mut graph: Graph = HashMap::new();
    for lsa in snapshot.values() {
        let edges = graph.entry(lsa.origin_node).or_default();
        for m in &lsa.neighbors {
            // Only keep edges where the LSDB also has an entry for the
            // neighbor: per spec.md §4.B, "status=up implies a live
            // Transport connection at both ends", so a one-sided neighbor
            // mention with no corresponding LSA isn't a usable path hop.
            if snapshot.contains_key(&m.neighbor) {
                edges.push((m.neighbor, edge_cost(weights, m)));
            }
        }
    }
    graph
}

fn dijkstra(
    graph: &Graph,
    source: NodeId,
    dest: NodeId,
    excluded_nodes: &HashSet<NodeId>,
    excluded_links: &HashSet<LinkKey>,
) -> Option<Path> {
    #[derive(PartialEq)]
    struct HeapItem(f64, NodeId);
    impl Eq for HeapItem {}
    impl Ord for HeapItem {
        fn cmp(&self, other: &Self) -> std::cmp::Ordering {
            other.0.partial_cmp(&self.0).unwrap_or(std::cmp::Ordering::Equal)
        }
    }
    impl PartialOrd for HeapItem {
        fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
            Some(self.cmp(other))
        }
    }

    let mut dist: HashMap<NodeId, f64> = HashMap::new();
    let mut prev: HashMap<NodeId, NodeId> = HashMap::new();
    let mut heap = BinaryHeap::new();

    dist.insert(source, 0.0);
    heap.push(HeapItem(0.0, source));

    while let Some(HeapItem(d, node)) = heap.pop() {
        if node == dest {
            break;
        }
        if d > *dist.get(&node).unwrap_or(&f64::INFINITY) {
            continue;
        }
        let Some(edges) = graph.get(&node) else {
            continue;
        };
        for (neighbor, cost) in edges {
            if excluded_nodes.contains(neighbor) {
                continue;
            }
            let link = LinkKey::new(node, *neighbor);
            if excluded_links.contains(&link) {
                continue;
            }
            let nd = d + cost;
            if nd < *dist.get(neighbor).unwrap_or(&f64::INFINITY) {
                dist.insert(*neighbor, nd);
                prev.insert(*neighbor, node);
                heap.push(HeapItem(nd, *neighbor));
            }
        }
    }

    if !dist.contains_key(&dest) {
        return None;
    }

    let mut nodes = vec![dest];
    let mut cur = dest;
    while cur != source {
        cur = *prev.get(&cur)?;
        nodes.push(cur);
    }
    nodes.reverse();

    Some(Path {
        nodes,
        cost: dist[&dest],
    })
}

/// Yen's algorithm, preferring link-disjoint alternatives over raw cost: when
/// extending the result set we try to find a path disjoint from every link
/// already selected before settling for the next-cheapest overlapping one.
pub fn k_shortest_paths(graph: &Graph, source: NodeId, dest: NodeId, k: usize) -> Vec<Path> {
    if source == dest || k == 0 {
        return vec![];
    }

    let mut result: Vec<Path> = Vec::new();
    let Some(first) = dijkstra(graph, source, dest, &HashSet::new(), &HashSet::new()) else {
        return vec![];
    };
    result.push(first);

    let mut candidates: Vec<Path> = Vec::new();

    while result.len() < k {
        let prev_path = result.last().unwrap().clone();

        for i in 0..prev_path.nodes.len().saturating_sub(1) {
            let spur_node = prev_path.nodes[i];
            let root_path = &prev_path.nodes[..=i];

            let mut excluded_links: HashSet<LinkKey> = HashSet::new();
            for p in &result {
                if p.nodes.len() > i && p.nodes[..=i] == *root_path {
                    excluded_links.insert(LinkKey::new(p.nodes[i], p.nodes[i + 1]));
                }
            }

            let excluded_nodes: HashSet<NodeId> =
                root_path[..root_path.len() - 1].iter().copied().collect();

            if let Some(spur) = dijkstra(graph, spur_node, dest, &excluded_nodes, &excluded_links) {
                let mut total_nodes = root_path[..root_path.len() - 1].to_vec();
                total_nodes.extend(spur.nodes);

                let root_cost: f64 = root_path
                    .windows(2)
                    .map(|w| {
                        graph
                            .get(&w[0])
                            .and_then(|edges| edges.iter().find(|(n, _)| *n == w[1]))
                            .map(|(_, c)| *c)
                            .unwrap_or(0.0)
                    })
                    .sum();

                let candidate = Path {
                    nodes: total_nodes,
                    cost: root_cost + spur.cost,
                };

                if !result.contains(&candidate) && !candidates.contains(&candidate) {
                    candidates.push(candidate);
                }
            }
        }

        if candidates.is_empty() {
            break;
        }

        candidates.sort_by(|a, b| link_disjoint_then_cost(a, b, &result));
        result.push(candidates.remove(0));
    }

    result
}

/// Orders candidates so a path disjoint from every already-selected path
/// sorts before an overlapping one, falling back to (cost, hops, id).
fn link_disjoint_then_cost(a: &Path, b: &Path, selected: &[Path]) -> std::cmp::Ordering {
    let a_disjoint = is_link_disjoint(a, selected);
    let b_disjoint = is_link_disjoint(b, selected);
    match (a_disjoint, b_disjoint) {
        (true, false) => std::cmp::Ordering::Less,
        (false, true) => std::cmp::Ordering::Greater,
        _ => a.sort_key().cmp(&b.sort_key()),
    }
}

fn is_link_disjoint(candidate: &Path, selected: &[Path]) -> bool {
    let candidate_links: HashSet<LinkKey> = candidate.links().into_iter().collect();
    selected
        .iter()
        .all(|p| p.links().iter().all(|l| !candidate_links.contains(l)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsa::NeighborMeasurement;

    fn lsa(origin: u128, neighbors: &[(u128, f64)]) -> Lsa {
        Lsa {
            origin_node: NodeId(origin),
            sequence: 1,
            neighbors: neighbors
                .iter()
                .map(|(n, cost)| NeighborMeasurement {
                    neighbor: NodeId(*n),
                    latency_ms: *cost,
                    loss_bp: 0.0,
                    utilization: 0.0,
                })
                .collect(),
            signature: vec![],
        }
    }

    #[test]
    fn finds_shortest_path() {
        let mut snap = HashMap::new();
        snap.insert(NodeId(1), lsa(1, &[(2, 1.0), (3, 5.0)]));
        snap.insert(NodeId(2), lsa(2, &[(1, 1.0), (3, 1.0)]));
        snap.insert(NodeId(3), lsa(3, &[(1, 5.0), (2, 1.0)]));

        let graph = build_graph(&snap, &CostWeights::default());
        let paths = k_shortest_paths(&graph, NodeId(1), NodeId(3), 3);

        assert!(!paths.is_empty());
        assert_eq!(paths[0].nodes, vec![NodeId(1), NodeId(2), NodeId(3)]);
    }

    #[test]
    fn prefers_disjoint_second_path() {
        // Diamond topology: two node-disjoint routes from 1 to 4.
        let mut snap = HashMap::new();
        snap.insert(NodeId(1), lsa(1, &[(2, 1.0), (3, 1.0)]));
        snap.insert(NodeId(2), lsa(2, &[(1, 1.0), (4, 1.0)]));
        snap.insert(NodeId(3), lsa(3, &[(1, 1.0), (4, 1.0)]));
        snap.insert(NodeId(4), lsa(4, &[(2, 1.0), (3, 1.0)]));

        let graph = build_graph(&snap, &CostWeights::default());
        let paths = k_shortest_paths(&graph, NodeId(1), NodeId(4), 2);

        assert_eq!(paths.len(), 2);
        assert!(is_link_disjoint(&paths[1], &paths[..1]));
    }

    #[test]
    fn no_path_returns_empty() {
        let mut snap = HashMap::new();
        snap.insert(NodeId(1), lsa(1, &[]));
        snap.insert(NodeId(2), lsa(2, &[]));
        let graph = build_graph(&snap, &CostWeights::default());
        assert!(k_shortest_paths(&graph, NodeId(1), NodeId(2), 3).is_empty());
    }
}
