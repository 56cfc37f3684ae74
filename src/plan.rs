//! Shared contraction plans and the plan cache.
//!
//! A [`Plan`] is one node of the contraction tree under construction: the
//! vertex set it covers, its accumulated cost, and shared references to its
//! operands. Plans are cached by vertex set; when a cheaper way to build an
//! already-cached set is found, the node is improved *in place* so that
//! every plan already pointing at it observes the better cost. Reference
//! cycles cannot form because a child's vertex set is always a strict subset
//! of its parent's.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::bitset::BitSet;
use crate::network::TensorNetwork;
use crate::solution::{RangeNode, Step};

/// One shared node of a contraction tree.
pub struct Plan<const W: usize> {
    set: BitSet<W>,
    state: RefCell<PlanState<W>>,
}

struct PlanState<const W: usize> {
    total_cost: f64,
    left: Option<Rc<Plan<W>>>,
    right: Option<Rc<Plan<W>>>,
}

impl<const W: usize> Plan<W> {
    /// Vertices covered by this plan.
    #[inline]
    pub fn set(&self) -> BitSet<W> {
        self.set
    }

    /// Accumulated contraction cost of the subtree.
    #[inline]
    pub fn total_cost(&self) -> f64 {
        self.state.borrow().total_cost
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.state.borrow().left.is_none()
    }

    /// Both operands, or `None` for a singleton plan.
    pub fn children(&self) -> Option<(Rc<Plan<W>>, Rc<Plan<W>>)> {
        let state = self.state.borrow();
        match (&state.left, &state.right) {
            (Some(l), Some(r)) => Some((Rc::clone(l), Rc::clone(r))),
            _ => None,
        }
    }
}

/// Plans keyed by their vertex set.
pub struct PlanCache<const W: usize> {
    plans: FxHashMap<BitSet<W>, Rc<Plan<W>>>,
}

impl<const W: usize> Default for PlanCache<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const W: usize> PlanCache<W> {
    pub fn new() -> Self {
        Self {
            plans: FxHashMap::default(),
        }
    }

    /// Seed a zero-cost singleton plan for every vertex.
    pub fn init_base_tensors(&mut self, n: usize) {
        for v in 0..n {
            let set = BitSet::singleton(v);
            self.plans.entry(set).or_insert_with(|| {
                Rc::new(Plan {
                    set,
                    state: RefCell::new(PlanState {
                        total_cost: 0.0,
                        left: None,
                        right: None,
                    }),
                })
            });
        }
    }

    /// The cached plan for `set`; it must exist.
    pub fn plan(&self, set: &BitSet<W>) -> Rc<Plan<W>> {
        Rc::clone(self.plans.get(set).expect("plan missing from cache"))
    }

    /// Combine two disjoint plans. On a cache hit the shared node keeps its
    /// identity and is rewired in place when the new cost is lower.
    pub fn create_plan(
        &mut self,
        net: &TensorNetwork<W>,
        left: Rc<Plan<W>>,
        right: Rc<Plan<W>>,
    ) -> Rc<Plan<W>> {
        debug_assert!(!left.set.intersects(&right.set));
        let total = left.set | right.set;

        // The contraction cost must be recomputed per pair: unlike join
        // ordering, the same total set has pair-dependent costs.
        let cost =
            net.contraction_cost(&left.set, &right.set) + left.total_cost() + right.total_cost();

        if let Some(existing) = self.plans.get(&total) {
            let existing = Rc::clone(existing);
            if cost < existing.total_cost() {
                *existing.state.borrow_mut() = PlanState {
                    total_cost: cost,
                    left: Some(left),
                    right: Some(right),
                };
            }
            return existing;
        }
        let plan = Rc::new(Plan {
            set: total,
            state: RefCell::new(PlanState {
                total_cost: cost,
                left: Some(left),
                right: Some(right),
            }),
        });
        self.plans.insert(total, Rc::clone(&plan));
        plan
    }

    /// Fold a linearization into its left-deep plan.
    pub fn translate_linear(
        &mut self,
        net: &TensorNetwork<W>,
        order: &[usize],
    ) -> Rc<Plan<W>> {
        self.init_base_tensors(net.vertex_count());
        let mut plan = self.plan(&BitSet::singleton(order[0]));
        for &v in &order[1..] {
            let right = self.plan(&BitSet::singleton(v));
            plan = self.create_plan(net, plan, right);
        }
        debug_assert_eq!(plan.set().len(), net.vertex_count());
        plan
    }

    /// Build the plan of a bushy solution bottom-up.
    pub fn translate_bushy(
        &mut self,
        net: &TensorNetwork<W>,
        sol: &[RangeNode],
    ) -> Rc<Plan<W>> {
        self.init_base_tensors(net.vertex_count());
        self.build_bushy(net, sol, sol.len() - 1)
    }

    fn build_bushy(
        &mut self,
        net: &TensorNetwork<W>,
        sol: &[RangeNode],
        index: usize,
    ) -> Rc<Plan<W>> {
        match sol[index] {
            RangeNode::Leaf { vertex } => self.plan(&BitSet::singleton(vertex)),
            RangeNode::Node { left, right, .. } => {
                let l = self.build_bushy(net, sol, left);
                let r = self.build_bushy(net, sol, right);
                self.create_plan(net, l, r)
            }
        }
    }
}

/// Flatten a plan into its post-order contraction sequence. Leaves keep
/// their vertex ids; step `k` produces intermediate `n + k`.
pub fn plan_to_sequence<const W: usize>(n: usize, plan: &Rc<Plan<W>>) -> Vec<Step> {
    let mut steps = Vec::with_capacity(n.saturating_sub(1));
    let mut next_id = n;
    let root_id = emit_steps(plan, &mut next_id, &mut steps);
    debug_assert!(n <= 1 || root_id == 2 * n - 2);
    debug_assert_eq!(steps.len(), n.saturating_sub(1));
    steps
}

fn emit_steps<const W: usize>(
    plan: &Rc<Plan<W>>,
    next_id: &mut usize,
    steps: &mut Vec<Step>,
) -> usize {
    match plan.children() {
        None => {
            debug_assert_eq!(plan.set().len(), 1);
            plan.set().min()
        }
        Some((l, r)) => {
            let left = emit_steps(&l, next_id, steps);
            let right = emit_steps(&r, next_id, steps);
            steps.push(Step { left, right });
            let id = *next_id;
            *next_id += 1;
            id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solution::linear_as_bushy;

    fn prepared_path() -> TensorNetwork<1> {
        let mut net = TensorNetwork::new(4, vec![(0, 1, 2.0), (1, 2, 3.0), (2, 3, 4.0)], &[]);
        net.prepare_for_optimization();
        net
    }

    #[test]
    fn test_translate_linear_cost() {
        let net = prepared_path();
        let mut cache = PlanCache::new();
        let plan = cache.translate_linear(&net, &[0, 1, 2, 3]);
        assert_eq!(plan.total_cost(), 22.0);
        assert_eq!(plan.set(), BitSet::fill(4));
    }

    #[test]
    fn test_translate_bushy_matches_network_cost() {
        let net = prepared_path();
        let mut cache = PlanCache::new();
        let sol = linear_as_bushy(&[3, 2, 1, 0]);
        let plan = cache.translate_bushy(&net, &sol);
        assert_eq!(plan.total_cost(), net.bushy_cost(&sol));
        assert_eq!(plan.total_cost(), 20.0);
    }

    #[test]
    fn test_collision_improves_shared_node_in_place() {
        let net = prepared_path();
        let mut cache = PlanCache::new();
        cache.init_base_tensors(4);

        let a = cache.plan(&BitSet::singleton(0));
        let b = cache.plan(&BitSet::singleton(1));
        let first = cache.create_plan(&net, a, b);
        let handle = Rc::clone(&first);
        assert_eq!(handle.total_cost(), 6.0);

        // Re-deriving the same set in the other operand order is no cheaper,
        // so the node is returned unchanged.
        let a = cache.plan(&BitSet::singleton(1));
        let b = cache.plan(&BitSet::singleton(0));
        let again = cache.create_plan(&net, a, b);
        assert!(Rc::ptr_eq(&handle, &again));
        assert_eq!(handle.total_cost(), 6.0);
    }

    #[test]
    fn test_improvement_visible_through_old_handles() {
        // Two different buildups of {0, 1, 2}: via the expensive pair (1, 2)
        // first, then via the cheap left-deep order. The cached node must
        // show the improvement through the first handle.
        let net = prepared_path();
        let mut cache = PlanCache::new();
        cache.init_base_tensors(4);

        let p12 = {
            let a = cache.plan(&BitSet::singleton(1));
            let b = cache.plan(&BitSet::singleton(2));
            cache.create_plan(&net, a, b)
        };
        let v0 = cache.plan(&BitSet::singleton(0));
        let expensive = cache.create_plan(&net, v0, p12);
        let held = Rc::clone(&expensive);
        // (1, 2) costs 24, joining 0 costs 8.
        assert_eq!(held.total_cost(), 32.0);

        let p01 = {
            let a = cache.plan(&BitSet::singleton(0));
            let b = cache.plan(&BitSet::singleton(1));
            cache.create_plan(&net, a, b)
        };
        let v2 = cache.plan(&BitSet::singleton(2));
        let improved = cache.create_plan(&net, p01, v2);
        assert!(Rc::ptr_eq(&held, &improved));
        assert_eq!(held.total_cost(), 18.0);
    }

    #[test]
    fn test_plan_to_sequence_is_topological() {
        let net = prepared_path();
        let mut cache = PlanCache::new();
        let sol = linear_as_bushy(&[2, 3, 1, 0]);
        let plan = cache.translate_bushy(&net, &sol);
        let steps = plan_to_sequence(4, &plan);
        assert_eq!(steps.len(), 3);
        for (k, step) in steps.iter().enumerate() {
            assert!(step.left < 4 + k);
            assert!(step.right < 4 + k);
        }
        assert_eq!(steps[0], Step { left: 2, right: 3 });
        assert_eq!(steps[1], Step { left: 4, right: 1 });
        assert_eq!(steps[2], Step { left: 5, right: 0 });
    }
}
