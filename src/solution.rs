//! Output shapes: bushy range trees and post-order contraction sequences.

use serde::{Deserialize, Serialize};

/// One node of a bushy contraction tree stored as a flat post-order array.
///
/// `left` and `right` index earlier entries of the same array; the root is
/// the last entry. `split` records the split vertex chosen by the planner.
/// It is cosmetic: plan construction re-derives the operand sets from the
/// recursion structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeNode {
    Leaf { vertex: usize },
    Node { split: usize, left: usize, right: usize },
}

/// Widen a linearization into the equivalent left-deep bushy tree.
///
/// Entries `0..n` are the leaves in linearization order, entry `n + t` joins
/// the running prefix with leaf `t + 1`.
pub fn linear_as_bushy(order: &[usize]) -> Vec<RangeNode> {
    let n = order.len();
    let mut sol = Vec::with_capacity(2 * n - 1);
    for &v in order {
        sol.push(RangeNode::Leaf { vertex: v });
    }
    let mut prev = 0;
    for t in 1..n {
        sol.push(RangeNode::Node {
            split: order[t],
            left: prev,
            right: t,
        });
        prev = n + t - 1;
    }
    sol
}

/// A single pairwise contraction.
///
/// Operands are post-order ids: `0..n` are the input tensors, and step `k`
/// of a [`Solution`] produces intermediate `n + k`. Both operands of a step
/// always predate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub left: usize,
    pub right: usize,
}

/// An optimized contraction order together with its total scalar cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    /// Sum of the per-contraction costs of the whole tree.
    pub cost: f64,
    /// The `n - 1` pairwise contractions in post-order.
    pub steps: Vec<Step>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_as_bushy_shape() {
        let sol = linear_as_bushy(&[2, 0, 1, 3]);
        assert_eq!(sol.len(), 7);
        assert_eq!(sol[0], RangeNode::Leaf { vertex: 2 });
        assert_eq!(
            sol[4],
            RangeNode::Node {
                split: 0,
                left: 0,
                right: 1
            }
        );
        assert_eq!(
            sol[5],
            RangeNode::Node {
                split: 1,
                left: 4,
                right: 2
            }
        );
        // Each internal node chains on the previous one.
        assert_eq!(
            sol[6],
            RangeNode::Node {
                split: 3,
                left: 5,
                right: 3
            }
        );
    }

    #[test]
    fn test_linear_as_bushy_two_vertices() {
        let sol = linear_as_bushy(&[1, 0]);
        assert_eq!(
            sol,
            vec![
                RangeNode::Leaf { vertex: 1 },
                RangeNode::Leaf { vertex: 0 },
                RangeNode::Node {
                    split: 0,
                    left: 0,
                    right: 1
                },
            ]
        );
    }
}
