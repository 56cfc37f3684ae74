//! Greedy contraction: repeatedly contract the cheapest edge.
//!
//! Each internal edge is queued once with its initial contraction cost;
//! ties break on edge id. Contractions merge the endpoint clusters through
//! the plan cache, and entries whose endpoints have since fallen into the
//! same cluster are simply discarded when popped. A live entry may carry a
//! stale key, in which case it still contracts at its current cluster cost.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::rc::Rc;

use ordered_float::OrderedFloat;

use crate::bitset::BitSet;
use crate::network::TensorNetwork;
use crate::plan::{Plan, PlanCache};

/// Contract the whole network greedily and return its plan.
pub fn run_greedy<const W: usize>(
    net: &TensorNetwork<W>,
    cache: &mut PlanCache<W>,
) -> Rc<Plan<W>> {
    let n = net.vertex_count();
    cache.init_base_tensors(n);

    // Cluster of every vertex, as a vertex set.
    let mut cluster: Vec<BitSet<W>> = (0..n).map(BitSet::singleton).collect();

    let mut heap: BinaryHeap<Reverse<(OrderedFloat<f64>, usize)>> = (0..net.edge_count())
        .map(|edge_id| {
            let (u, v) = net.edge_endpoints(edge_id);
            let cost = net.contraction_cost(&cluster[u], &cluster[v]);
            Reverse((OrderedFloat(cost), edge_id))
        })
        .collect();

    while let Some(Reverse((_, edge_id))) = heap.pop() {
        let (u, v) = net.edge_endpoints(edge_id);
        if cluster[u] == cluster[v] {
            continue;
        }
        let (left, right) = (cluster[u], cluster[v]);
        let l = cache.plan(&left);
        let r = cache.plan(&right);
        cache.create_plan(net, l, r);

        let merged = left | right;
        for w in merged.iter() {
            cluster[w] = merged;
        }
    }

    cache.plan(&BitSet::fill(n))
}
