//! # tnorder - Contraction Order Optimization for Tensor Networks
//!
//! A tensor network is an undirected multigraph: vertices are tensors and
//! every edge is a shared index ("leg") with a positive dimension. To
//! evaluate the network it is contracted pairwise, and the total cost
//! depends dramatically on the order of those pairwise contractions. This
//! crate computes cheap contraction orders, guided by an externally supplied
//! spanning tree of the network.
//!
//! Finding the optimal order is NP-complete; the planners here are fast
//! heuristics borrowed from join ordering:
//!
//! | Algorithm | Description |
//! |-----------|-------------|
//! | `tensor-ikkbz` | Rank-based linearization of the spanning tree, once per root |
//! | `lindp` | TensorIKKBZ linearizations reshaped into bushy trees by an O(n^3) interval DP |
//! | `greedy` | Repeated cheapest-edge contraction |
//! | `tensor-ikkbz-parallel`, `lindp-parallel` | The same, with the per-root work spread over a worker pool |
//!
//! ## Example
//!
//! ```rust
//! use tnorder::{optimize, parse_network, Algorithm};
//!
//! // A triangle of tensors and a spanning tree of it.
//! let graph = parse_network("3 3 0  0 1 4  1 2 5  0 2 3").unwrap();
//! let tree = parse_network("3 2 0  0 1 4  1 2 5").unwrap();
//!
//! let solution = optimize(&graph, &tree, Algorithm::LinDp, 1).unwrap();
//! assert_eq!(solution.steps.len(), 2);
//! println!("cost: {}", solution.cost);
//! ```
//!
//! The result is a post-order list of pairwise contractions: operands
//! `0..n` are the input tensors and step `k` produces intermediate `n + k`.
//!
//! Internally every vertex and leg set is a fixed-width bit set; the width
//! is chosen once per run from the network size (up to 2048 legs) and never
//! appears in this API.

pub mod bitset;
pub mod error;
pub mod ffi;
pub mod greedy;
pub mod ikkbz;
pub mod io;
pub mod lindp;
pub mod network;
pub mod optimizer;
pub mod plan;
pub mod solution;

#[cfg(test)]
pub mod test_utils;

pub use error::{Error, Result};
pub use io::{parse_network, read_network, EdgeSpec, NetworkSpec};
pub use optimizer::Algorithm;
pub use solution::{Solution, Step};

use network::build_with_tree_view;
use plan::plan_to_sequence;

/// Widest supported variant: 2048 leg slots.
const MAX_LEGS: usize = 2048;

fn run<const W: usize>(
    graph: &NetworkSpec,
    tree: &NetworkSpec,
    algorithm: Algorithm,
    num_threads: usize,
) -> Result<Solution> {
    let mut net = build_with_tree_view::<W>(graph, tree)?;
    let plan = optimizer::run_algorithm(&mut net, algorithm, num_threads)?;
    Ok(Solution {
        cost: plan.total_cost(),
        steps: plan_to_sequence(graph.n, &plan),
    })
}

/// Compute a contraction order for `graph`, using `tree` as the spanning
/// tree consulted by the TensorIKKBZ planners.
///
/// `num_threads` only affects the `-parallel` algorithms; 0 means "all
/// available cores but one".
///
/// The bit-set width is dispatched here from `n + m`, the number of leg
/// slots the run needs.
pub fn optimize(
    graph: &NetworkSpec,
    tree: &NetworkSpec,
    algorithm: Algorithm,
    num_threads: usize,
) -> Result<Solution> {
    graph.validate()?;
    tree.validate()?;
    let safe_size = graph.n + graph.edges.len();
    match safe_size {
        0..=64 => run::<1>(graph, tree, algorithm, num_threads),
        65..=128 => run::<2>(graph, tree, algorithm, num_threads),
        129..=256 => run::<4>(graph, tree, algorithm, num_threads),
        257..=512 => run::<8>(graph, tree, algorithm, num_threads),
        513..=1024 => run::<16>(graph, tree, algorithm, num_threads),
        1025..=2048 => run::<32>(graph, tree, algorithm, num_threads),
        _ => Err(Error::CapacityExceeded {
            required: safe_size,
            limit: MAX_LEGS,
        }),
    }
}

/// Read both input files and optimize.
pub fn optimize_files<P: AsRef<std::path::Path>>(
    graph_path: P,
    tree_path: P,
    algorithm: Algorithm,
    num_threads: usize,
) -> Result<Solution> {
    let graph = read_network(graph_path)?;
    let tree = read_network(tree_path)?;
    optimize(&graph, &tree, algorithm, num_threads)
}
