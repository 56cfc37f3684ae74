//! LinDP: interval dynamic programming over a linearization.
//!
//! Given a linear contraction order, the classic O(n^3) interval DP reshapes
//! it into the cheapest bushy tree whose leaves keep that order. Interval
//! sizes and surviving-leg sets are precomputed incrementally; the split
//! cost divides the larger operand by the common-leg product before
//! multiplying by the smaller one, which keeps intermediate magnitudes down.

use crate::bitset::BitSet;
use crate::network::TensorNetwork;
use crate::solution::RangeNode;

/// Splits whose operands share no leg are outer products: they blow up the
/// intermediate tensor and are refused by default.
const ALLOW_OUTER_PRODUCTS: bool = false;

/// Reshape `order` into a bushy tree and return it with its cost.
///
/// Panics if the root interval is infeasible, which cannot happen for a
/// linearization of a connected network while outer products are refused.
pub fn run_local_lindp<const W: usize>(
    net: &TensorNetwork<W>,
    order: &[usize],
) -> (f64, Vec<RangeNode>) {
    net.set_tree_view_enabled(false);

    let n = net.vertex_count();
    let mut dp = vec![vec![f64::INFINITY; n]; n];
    let mut ptr = vec![vec![usize::MAX; n]; n];
    let mut legs: Vec<Vec<BitSet<W>>> = vec![vec![BitSet::new(); n]; n];
    let mut sizes = vec![vec![0.0f64; n]; n];

    // Surviving legs and tensor size of every interval [i, j].
    for i in (0..n).rev() {
        let mut curr_size = 1.0f64;
        let mut curr_legs: BitSet<W> = BitSet::new();
        for j in i..n {
            let incoming = net.vertex_legs[order[j]];
            let common = net.leg_product(&(curr_legs & incoming));
            curr_size = (curr_size / common) * (net.vertex_sizes[order[j]] / common);
            curr_legs ^= incoming;
            sizes[i][j] = curr_size;
            legs[i][j] = curr_legs;
        }
    }

    for (i, row) in dp.iter_mut().enumerate() {
        row[i] = 0.0;
    }

    for d in 1..n {
        for i in 0..n - d {
            let j = i + d;
            for k in i..j {
                let (l, r) = (dp[i][k], dp[k + 1][j]);
                if l.is_infinite() || r.is_infinite() {
                    continue;
                }
                let common_legs = legs[i][k] & legs[k + 1][j];
                if !ALLOW_OUTER_PRODUCTS && common_legs.is_empty() {
                    continue;
                }
                let common = net.leg_product(&common_legs);
                let (left_size, right_size) = (sizes[i][k], sizes[k + 1][j]);
                let contraction =
                    (left_size.max(right_size) / common) * left_size.min(right_size);
                if l + r + contraction < dp[i][j] {
                    dp[i][j] = l + r + contraction;
                    ptr[i][j] = k;
                }
            }
        }
    }

    let mut sol = Vec::with_capacity(2 * n - 1);
    build_solution(order, &ptr, 0, n - 1, &mut sol);
    let cost = net.bushy_cost(&sol);
    log::trace!("lindp local cost {cost:e}");
    (cost, sol)
}

fn build_solution(
    order: &[usize],
    ptr: &[Vec<usize>],
    i: usize,
    j: usize,
    sol: &mut Vec<RangeNode>,
) -> usize {
    if i == j {
        sol.push(RangeNode::Leaf { vertex: order[i] });
        return sol.len() - 1;
    }
    let k = ptr[i][j];
    assert!(
        k != usize::MAX,
        "no feasible split for interval [{i}, {j}] without outer products"
    );
    debug_assert!(i <= k && k < j);
    let left = build_solution(order, ptr, i, k, sol);
    let right = build_solution(order, ptr, k + 1, j, sol);
    sol.push(RangeNode::Node {
        split: order[k],
        left,
        right,
    });
    sol.len() - 1
}
