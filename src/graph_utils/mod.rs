//! Generic helpers for the index-based directed graphs used by the
//! pre-samplex and samplex.

use petgraph::Direction;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;

/// Partitions a DAG into topological generations: the first generation holds
/// the nodes with no predecessors, the next the nodes whose predecessors all
/// sit in earlier generations, and so on. Nodes within a generation are
/// sorted by index so the result is deterministic.
pub fn topological_generations<N, E>(graph: &StableDiGraph<N, E>) -> Vec<Vec<NodeIndex>> {
    let mut in_degree: HashMap<NodeIndex, usize> = graph
        .node_indices()
        .map(|node| (node, graph.neighbors_directed(node, Direction::Incoming).count()))
        .collect();

    let mut current: Vec<NodeIndex> = in_degree
        .iter()
        .filter(|&(_, &degree)| degree == 0)
        .map(|(&node, _)| node)
        .collect();
    current.sort_unstable();

    let mut generations = Vec::new();
    while !current.is_empty() {
        let mut next = Vec::new();
        for &node in &current {
            for successor in graph.neighbors_directed(node, Direction::Outgoing) {
                let degree = in_degree.get_mut(&successor).expect("successor is in the graph");
                *degree -= 1;
                if *degree == 0 {
                    next.push(successor);
                }
            }
        }
        next.sort_unstable();
        next.dedup();
        generations.push(std::mem::replace(&mut current, next));
    }
    generations
}

/// Yields clusters of nodes that are all pairwise compatible according to
/// `compare_fn`, where clusters never span topological generations.
///
/// Within a generation, each node joins the first cluster whose members it
/// is compatible with, or starts a new one.
pub fn cluster_compatible_nodes<N, E>(
    graph: &StableDiGraph<N, E>,
    compare_fn: impl Fn(&StableDiGraph<N, E>, NodeIndex, NodeIndex) -> bool,
) -> Vec<Vec<NodeIndex>> {
    let mut all_clusters = Vec::new();
    for generation in topological_generations(graph) {
        let mut clusters: Vec<Vec<NodeIndex>> = Vec::new();
        'nodes: for node in generation {
            for cluster in &mut clusters {
                if cluster
                    .iter()
                    .all(|&member| compare_fn(graph, node, member))
                {
                    cluster.push(node);
                    continue 'nodes;
                }
            }
            clusters.push(vec![node]);
        }
        all_clusters.extend(clusters);
    }
    all_clusters
}

/// Replaces the given nodes with a single new node, preserving all edges to
/// and from the rest of the graph.
///
/// Returns the new node index together with the successor and predecessor
/// edge indices, ordered by the order of `node_idxs`. Edges internal to the
/// replaced set are dropped.
pub fn replace_nodes_with_one_node<N, E: Clone>(
    graph: &mut StableDiGraph<N, E>,
    node_idxs: &[NodeIndex],
    new_node: N,
) -> (NodeIndex, Vec<EdgeIndex>, Vec<EdgeIndex>) {
    let new_node_idx = graph.add_node(new_node);

    let mut successor_edges = Vec::new();
    let mut predecessor_edges = Vec::new();
    for &node_idx in node_idxs {
        let outgoing: Vec<(NodeIndex, E)> = graph
            .edges_directed(node_idx, Direction::Outgoing)
            .map(|edge| (edge.target(), edge.weight().clone()))
            .collect();
        for (target, weight) in outgoing {
            successor_edges.push(graph.add_edge(new_node_idx, target, weight));
        }
        let incoming: Vec<(NodeIndex, E)> = graph
            .edges_directed(node_idx, Direction::Incoming)
            .map(|edge| (edge.source(), edge.weight().clone()))
            .collect();
        for (source, weight) in incoming {
            predecessor_edges.push(graph.add_edge(source, new_node_idx, weight));
        }
        graph.remove_node(node_idx);
    }

    // Edges between replaced nodes have become self-loops on the new node.
    let self_loops: Vec<EdgeIndex> = graph
        .edges_directed(new_node_idx, Direction::Outgoing)
        .filter(|edge| edge.target() == new_node_idx)
        .map(|edge| edge.id())
        .collect();
    for edge in &self_loops {
        graph.remove_edge(*edge);
    }
    successor_edges.retain(|edge| !self_loops.contains(edge));
    predecessor_edges.retain(|edge| !self_loops.contains(edge));

    (new_node_idx, successor_edges, predecessor_edges)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> (StableDiGraph<&'static str, ()>, Vec<NodeIndex>) {
        let mut graph = StableDiGraph::new();
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        let c = graph.add_node("c");
        let d = graph.add_node("d");
        graph.add_edge(a, b, ());
        graph.add_edge(a, c, ());
        graph.add_edge(b, d, ());
        graph.add_edge(c, d, ());
        (graph, vec![a, b, c, d])
    }

    #[test]
    fn generations_of_a_diamond() {
        let (graph, nodes) = diamond();
        let generations = topological_generations(&graph);
        assert_eq!(generations.len(), 3);
        assert_eq!(generations[0], vec![nodes[0]]);
        assert_eq!(generations[1], vec![nodes[1], nodes[2]]);
        assert_eq!(generations[2], vec![nodes[3]]);
    }

    #[test]
    fn clustering_respects_generations() {
        let (graph, nodes) = diamond();
        // everything is compatible with everything; clusters still cannot
        // span generations
        let clusters = cluster_compatible_nodes(&graph, |_, _, _| true);
        assert_eq!(
            clusters,
            vec![vec![nodes[0]], vec![nodes[1], nodes[2]], vec![nodes[3]]]
        );
    }

    #[test]
    fn clustering_splits_incompatible_nodes() {
        let (graph, nodes) = diamond();
        let clusters = cluster_compatible_nodes(&graph, |_, lhs, rhs| lhs == rhs);
        assert_eq!(clusters.len(), 4);
        assert!(clusters.contains(&vec![nodes[1]]));
    }

    #[test]
    fn replacement_preserves_external_edges() {
        let (mut graph, nodes) = diamond();
        let (merged, successors, predecessors) =
            replace_nodes_with_one_node(&mut graph, &[nodes[1], nodes[2]], "bc");
        assert_eq!(graph.node_count(), 3);
        assert_eq!(successors.len(), 2);
        assert_eq!(predecessors.len(), 2);
        assert!(graph.contains_edge(nodes[0], merged));
        assert!(graph.contains_edge(merged, nodes[3]));
    }
}
