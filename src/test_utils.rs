//! Test utilities: random networks and an independent cost evaluator.
//!
//! The generator produces seeded, connected multigraphs together with a
//! spanning tree extracted by Kruskal, so end-to-end tests can exercise the
//! optimizer on inputs it has never seen. The evaluator replays a
//! contraction sequence with plain hash sets, deliberately sharing no code
//! with the bit-set leg algebra it cross-checks.

use std::collections::HashSet;

use petgraph::algo::min_spanning_tree;
use petgraph::data::Element;
use petgraph::graph::{NodeIndex, UnGraph};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::io::{EdgeSpec, NetworkSpec};
use crate::solution::Step;

/// Generate a connected random network of `n` vertices: a random tree
/// skeleton plus `extras` additional edges (parallel edges allowed), with
/// small random dimensions and occasional open legs. Returns the graph and
/// a spanning tree of it.
pub fn random_network(n: usize, extras: usize, seed: u64) -> (NetworkSpec, NetworkSpec) {
    assert!(n >= 1);
    let mut rng = StdRng::seed_from_u64(seed);

    let mut edges = Vec::new();
    for v in 1..n {
        let parent = rng.random_range(0..v);
        let dim = rng.random_range(2..=4) as f64;
        edges.push(EdgeSpec { u: parent, v, dim });
    }
    for _ in 0..extras {
        if n < 2 {
            break;
        }
        let u = rng.random_range(0..n);
        let mut v = rng.random_range(0..n);
        while v == u {
            v = rng.random_range(0..n);
        }
        let dim = rng.random_range(2..=4) as f64;
        edges.push(EdgeSpec { u, v, dim });
    }

    let mut open_legs = Vec::new();
    for v in 0..n {
        if rng.random_range(0..3) == 0 {
            open_legs.push((v, rng.random_range(2..=3) as f64));
        }
    }

    let graph = NetworkSpec {
        n,
        edges,
        open_legs: open_legs.clone(),
    };
    let tree = NetworkSpec {
        n,
        edges: spanning_tree_of(&graph),
        open_legs,
    };
    (graph, tree)
}

/// Extract a spanning tree with Kruskal, keeping the graph's dimensions on
/// the chosen edges.
fn spanning_tree_of(spec: &NetworkSpec) -> Vec<EdgeSpec> {
    let mut g: UnGraph<(), f64> = UnGraph::new_undirected();
    for _ in 0..spec.n {
        g.add_node(());
    }
    for edge in &spec.edges {
        g.add_edge(NodeIndex::new(edge.u), NodeIndex::new(edge.v), edge.dim);
    }
    min_spanning_tree(&g)
        .filter_map(|element| match element {
            Element::Edge {
                source,
                target,
                weight,
            } => Some(EdgeSpec {
                u: source,
                v: target,
                dim: weight,
            }),
            Element::Node { .. } => None,
        })
        .collect()
}

/// Whether the leaves referenced by `steps` are exactly `0..n` and every
/// operand predates its consumer.
pub fn sequence_is_permutation(n: usize, steps: &[Step]) -> bool {
    let mut used = vec![false; 2 * n - 1];
    for (k, step) in steps.iter().enumerate() {
        for operand in [step.left, step.right] {
            if operand >= n + k || used[operand] {
                return false;
            }
            used[operand] = true;
        }
    }
    // Every leaf and every intermediate except the root is consumed once.
    used.iter().take(2 * n - 2).all(|&u| u)
}

/// Replay a contraction sequence and return its total cost, using hash-set
/// leg algebra independent of the optimizer's bit sets.
pub fn sequence_cost(spec: &NetworkSpec, steps: &[Step]) -> f64 {
    let n = spec.n;
    let m = spec.edges.len();

    let mut leg_dims: Vec<f64> = spec.edges.iter().map(|e| e.dim).collect();
    let mut open = vec![1.0f64; n];
    for &(v, dim) in &spec.open_legs {
        open[v] = dim;
    }
    leg_dims.extend_from_slice(&open);

    // Leg sets of the post-order nodes, leaves first.
    let mut legs: Vec<HashSet<usize>> = (0..n)
        .map(|v| {
            let mut set: HashSet<usize> = HashSet::new();
            for (id, edge) in spec.edges.iter().enumerate() {
                if edge.u == v || edge.v == v {
                    set.insert(id);
                }
            }
            set.insert(m + v);
            set
        })
        .collect();

    let mut total = 0.0;
    for step in steps {
        let left = &legs[step.left];
        let right = &legs[step.right];
        let union: f64 = left.union(right).map(|&leg| leg_dims[leg]).product();
        total += union;
        let surviving: HashSet<usize> = left.symmetric_difference(right).copied().collect();
        legs.push(surviving);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_network_is_connected_tree_pair() {
        for seed in 0..5 {
            let (graph, tree) = random_network(12, 4, seed);
            assert_eq!(graph.edges.len(), 11 + 4);
            assert_eq!(tree.edges.len(), 11);
            graph.validate().unwrap();
            tree.validate().unwrap();
            let net = crate::network::TensorNetwork::<1>::from_spec(&tree);
            assert!(net.is_tree());
        }
    }

    #[test]
    fn test_random_network_is_deterministic() {
        let (a, _) = random_network(10, 2, 42);
        let (b, _) = random_network(10, 2, 42);
        assert_eq!(a, b);
    }

    #[test]
    fn test_sequence_cost_on_known_path() {
        let spec = crate::parse_network("4 3 0  0 1 2  1 2 3  2 3 4").unwrap();
        let steps = [
            Step { left: 0, right: 1 },
            Step { left: 4, right: 2 },
            Step { left: 5, right: 3 },
        ];
        assert_eq!(sequence_cost(&spec, &steps), 22.0);
        assert!(sequence_is_permutation(4, &steps));
    }

    #[test]
    fn test_sequence_permutation_rejects_reuse() {
        let steps = [
            Step { left: 0, right: 1 },
            Step { left: 0, right: 2 },
        ];
        assert!(!sequence_is_permutation(3, &steps));
    }

    #[test]
    fn test_parallel_edges_in_evaluator() {
        let spec = crate::parse_network("2 2 0  0 1 2  0 1 3").unwrap();
        let steps = [Step { left: 0, right: 1 }];
        assert_eq!(sequence_cost(&spec, &steps), 6.0);
    }
}
