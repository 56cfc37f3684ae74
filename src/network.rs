//! The tensor network representation and its leg algebra.
//!
//! A network is an undirected multigraph: vertices are tensors, edges are
//! shared indices ("legs") with a positive dimension, and every vertex also
//! carries an open-leg dimension for its dangling indices. Legs live in one
//! flat id space: ids `0..m` are the internal edges and id `m + v` is the
//! virtual open leg of vertex `v`, so any leg dimension is a single array
//! lookup.
//!
//! A network may own a second network over the same vertices, the *tree
//! view*, used as a structural hint by the TensorIKKBZ planner. While a
//! thread's tree-view flag is on, reachability and leg queries transparently
//! resolve against the tree view instead of the graph. The flag is kept in
//! thread-local state keyed by a per-instance slot, so parallel workers
//! toggle their own view without synchronizing (see
//! [`TensorNetwork::register_thread`]).

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;

use crate::bitset::BitSet;
use crate::error::{Error, Result};
use crate::io::NetworkSpec;
use crate::solution::RangeNode;

static NEXT_VIEW_SLOT: AtomicU64 = AtomicU64::new(0);

thread_local! {
    /// Tree-view flags of the current thread, keyed by network slot id.
    /// An absent entry means the view is off, so single-threaded callers
    /// never need to register.
    static VIEW_FLAGS: RefCell<FxHashMap<u64, bool>> = RefCell::new(FxHashMap::default());
}

/// A tensor network over `n` vertices and `m` internal edges.
pub struct TensorNetwork<const W: usize> {
    pub(crate) n: usize,
    pub(crate) m: usize,
    /// Endpoints of the internal edges; parallel edges are permitted.
    pub(crate) edges: Vec<(usize, usize)>,
    /// Dimension of every leg: edge dims in `0..m`, open-leg dims after.
    pub(crate) leg_dims: Vec<f64>,
    /// Per-vertex `(neighbour, edge id)` adjacency.
    pub(crate) adj: Vec<Vec<(usize, usize)>>,
    /// Per-vertex open-leg dimension (product of dangling indices).
    pub(crate) open_leg_size: Vec<f64>,
    /// Filled by [`prepare_for_optimization`](Self::prepare_for_optimization).
    pub(crate) vertex_legs: Vec<BitSet<W>>,
    pub(crate) vertex_sizes: Vec<f64>,
    tree_view: Option<Box<TensorNetwork<W>>>,
    view_slot: u64,
}

impl<const W: usize> TensorNetwork<W> {
    /// Build a network from raw parts. Capacity and value validation happens
    /// in [`NetworkSpec`] / the dispatch boundary.
    pub fn new(n: usize, edges: Vec<(usize, usize, f64)>, open_legs: &[(usize, f64)]) -> Self {
        let m = edges.len();
        let mut open_leg_size = vec![1.0f64; n];
        for &(v, dim) in open_legs {
            open_leg_size[v] = dim;
        }
        let mut net = Self {
            n,
            m,
            edges: edges.iter().map(|&(u, v, _)| (u, v)).collect(),
            leg_dims: edges.iter().map(|&(_, _, d)| d).collect(),
            adj: Vec::new(),
            open_leg_size,
            vertex_legs: Vec::new(),
            vertex_sizes: Vec::new(),
            tree_view: None,
            view_slot: NEXT_VIEW_SLOT.fetch_add(1, Ordering::Relaxed),
        };
        net.init_graph_structure();
        net
    }

    pub fn from_spec(spec: &NetworkSpec) -> Self {
        Self::new(
            spec.n,
            spec.edges.iter().map(|e| (e.u, e.v, e.dim)).collect(),
            &spec.open_legs,
        )
    }

    /// Rebuild adjacency, neighbour sets and the open-leg tail of `leg_dims`
    /// from `edges` / `open_leg_size`.
    fn init_graph_structure(&mut self) {
        self.leg_dims.truncate(self.m);
        self.leg_dims.extend_from_slice(&self.open_leg_size);
        let mut adj: Vec<Vec<(usize, usize)>> = vec![Vec::new(); self.n];
        for (id, &(u, v)) in self.edges.iter().enumerate() {
            adj[u].push((v, id));
            adj[v].push((u, id));
        }
        self.adj = adj;
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.m
    }

    /// Attach a tree view. The tree must span the same vertex set.
    pub fn set_tree_view(&mut self, tree: TensorNetwork<W>) {
        debug_assert_eq!(tree.n, self.n);
        self.tree_view = Some(Box::new(tree));
    }

    pub fn tree_view(&self) -> Option<&TensorNetwork<W>> {
        self.tree_view.as_deref()
    }

    /// Seed this thread's tree-view flag. Parallel workers call this before
    /// the start barrier so every flag slot exists before any query runs.
    pub fn register_thread(&self) {
        VIEW_FLAGS.with(|flags| {
            flags.borrow_mut().insert(self.view_slot, false);
        });
    }

    /// Toggle the tree view for the calling thread only.
    pub fn set_tree_view_enabled(&self, value: bool) {
        VIEW_FLAGS.with(|flags| {
            flags.borrow_mut().insert(self.view_slot, value);
        });
    }

    pub fn tree_view_enabled(&self) -> bool {
        VIEW_FLAGS.with(|flags| {
            flags
                .borrow()
                .get(&self.view_slot)
                .copied()
                .unwrap_or(false)
        })
    }

    /// The network a delegating query actually reads: the tree view while
    /// this thread's flag is on, the graph otherwise.
    #[inline]
    fn active(&self) -> &TensorNetwork<W> {
        if self.tree_view_enabled() {
            self.tree_view
                .as_deref()
                .expect("tree view enabled without a tree attached")
        } else {
            self
        }
    }

    /// Dimension of internal edge `edge_id`. Delegates to the tree view.
    pub fn edge_dim(&self, edge_id: usize) -> f64 {
        let net = self.active();
        debug_assert!(edge_id < net.m);
        net.leg_dims[edge_id]
    }

    /// Endpoints of internal edge `edge_id` of the graph itself.
    #[inline]
    pub fn edge_endpoints(&self, edge_id: usize) -> (usize, usize) {
        self.edges[edge_id]
    }

    /// Product of the dimensions of the legs in `set`. Delegates to the tree
    /// view.
    pub fn leg_product(&self, set: &BitSet<W>) -> f64 {
        let net = self.active();
        set.iter().map(|leg| net.leg_dims[leg]).product()
    }

    /// All legs incident to `u`. In strict mode the virtual open leg `m + u`
    /// is left out; TensorIKKBZ uses strict mode to separate the actual open
    /// legs from the edges it ranks over. Delegates to the tree view.
    pub fn vertex_legs(&self, u: usize, strict: bool) -> BitSet<W> {
        debug_assert!(u < self.n);
        let net = self.active();
        let mut legs = BitSet::new();
        for &(_, edge_id) in &net.adj[u] {
            legs.insert(edge_id);
        }
        if !strict {
            legs.insert(net.m + u);
        }
        legs
    }

    /// Legs with exactly one endpoint inside `set`: the leg set of the
    /// supernode obtained by contracting `set`.
    pub fn open_legs(&self, set: &BitSet<W>) -> BitSet<W> {
        let mut legs = BitSet::new();
        for v in set.iter() {
            legs ^= self.vertex_legs(v, false);
        }
        legs
    }

    /// Cost of contracting the supernodes `a` and `b`: the product over the
    /// union of their open legs counts each output index once and each
    /// summed index once.
    pub fn contraction_cost(&self, a: &BitSet<W>, b: &BitSet<W>) -> f64 {
        let la = self.open_legs(a);
        let lb = self.open_legs(b);
        self.leg_product(&(la | lb))
    }

    /// Cost of contracting the vertices left to right in `order`.
    pub fn linear_cost(&self, order: &[usize]) -> f64 {
        let mut total = 0.0;
        let mut current = self.vertex_legs(order[0], false);
        for &v in &order[1..] {
            let legs = self.vertex_legs(v, false);
            total += self.leg_product(&(current | legs));
            current ^= legs;
        }
        total
    }

    /// Cost of a bushy solution, evaluated bottom-up.
    pub fn bushy_cost(&self, sol: &[RangeNode]) -> f64 {
        debug_assert!(!self.tree_view_enabled());
        self.bushy_cost_rec(sol, sol.len() - 1).0
    }

    fn bushy_cost_rec(&self, sol: &[RangeNode], index: usize) -> (f64, BitSet<W>) {
        match sol[index] {
            RangeNode::Leaf { vertex } => (0.0, BitSet::singleton(vertex)),
            RangeNode::Node { left, right, .. } => {
                let (lc, ls) = self.bushy_cost_rec(sol, left);
                let (rc, rs) = self.bushy_cost_rec(sol, right);
                debug_assert!(!ls.intersects(&rs));
                (lc + rc + self.contraction_cost(&ls, &rs), ls | rs)
            }
        }
    }

    /// Collect into `cum` everything reachable from `u` through vertices of
    /// `allowed`. Delegates to the tree view.
    pub fn reach(&self, u: usize, cum: &mut BitSet<W>, allowed: &BitSet<W>) {
        let net = self.active();
        net.reach_local(u, cum, allowed);
    }

    fn reach_local(&self, u: usize, cum: &mut BitSet<W>, allowed: &BitSet<W>) {
        cum.insert(u);
        for &(v, _) in &self.adj[u] {
            if !cum.contains(v) && allowed.contains(v) {
                self.reach_local(v, cum, allowed);
            }
        }
    }

    /// Whether the vertices of `set` form a connected subgraph.
    pub fn is_connected(&self, set: &BitSet<W>) -> bool {
        let mut cum = BitSet::new();
        self.reach(set.min(), &mut cum, set);
        set.is_subset_of(&cum)
    }

    /// Whether `order[i..=j]` is connected.
    pub fn is_range_connected(&self, i: usize, j: usize, order: &[usize]) -> bool {
        let set: BitSet<W> = order[i..=j].iter().copied().collect();
        self.is_connected(&set)
    }

    /// Whether the network is a spanning tree: connected with `n - 1` edges.
    pub fn is_tree(&self) -> bool {
        if self.n == 0 || self.m != self.n - 1 {
            return false;
        }
        let all = BitSet::fill(self.n);
        let mut cum = BitSet::new();
        self.reach_local(0, &mut cum, &all);
        cum.len() == self.n
    }

    /// Build the sub-network induced by `ids`. Edges leaving `ids` are folded
    /// into the open-leg dimension of their inner endpoint; edges inside are
    /// renumbered densely, keeping only the first of a parallel bundle.
    pub fn slice(&self, ids: &BitSet<W>) -> TensorNetwork<W> {
        let sn = ids.len();
        let mut mapping = vec![usize::MAX; self.n];
        let mut open = Vec::with_capacity(sn);
        for (index, v) in ids.iter().enumerate() {
            mapping[v] = index;
            open.push(self.open_leg_size[v]);
        }

        let mut neighbors: Vec<BitSet<W>> = vec![BitSet::new(); sn];
        let mut edges = Vec::new();
        for u in ids.iter() {
            for &(v, edge_id) in &self.adj[u] {
                let dim = self.leg_dims[edge_id];
                if ids.contains(v) {
                    let (a, b) = (mapping[u], mapping[v]);
                    debug_assert_ne!(a, b);
                    if neighbors[a].contains(b) {
                        continue;
                    }
                    neighbors[a].insert(b);
                    neighbors[b].insert(a);
                    edges.push((a, b, dim));
                } else {
                    open[mapping[u]] *= dim;
                }
            }
        }

        let open_legs: Vec<(usize, f64)> = open.iter().copied().enumerate().collect();
        TensorNetwork::new(sn, edges, &open_legs)
    }

    /// Contract the vertices of `ids` into their lowest-indexed member in
    /// place. Boundary edges are redirected to the representative with
    /// parallel bundles merged multiplicatively; internal edges disappear;
    /// the representative absorbs the open-leg dimensions of the others.
    pub fn contract_subgraph(&mut self, ids: &BitSet<W>) {
        let repr = ids.min();

        let mut incoming = vec![-1.0f64; self.n];
        let mut kept = 0;
        for index in 0..self.m {
            let (u, v) = self.edges[index];
            let dim = self.leg_dims[index];
            match (ids.contains(u), ids.contains(v)) {
                (true, true) => {}
                (true, false) => {
                    if incoming[v] < 0.0 {
                        incoming[v] = 1.0;
                    }
                    incoming[v] *= dim;
                }
                (false, true) => {
                    if incoming[u] < 0.0 {
                        incoming[u] = 1.0;
                    }
                    incoming[u] *= dim;
                }
                (false, false) => {
                    self.edges[kept] = (u, v);
                    self.leg_dims[kept] = dim;
                    kept += 1;
                }
            }
        }
        self.edges.truncate(kept);
        self.leg_dims.truncate(kept);
        for (v, &dim) in incoming.iter().enumerate() {
            if dim > 0.0 {
                debug_assert_ne!(v, repr);
                self.edges.push((v, repr));
                self.leg_dims.push(dim);
            }
        }
        self.m = self.edges.len();

        for u in ids.iter() {
            if u != repr {
                let absorbed = self.open_leg_size[u];
                self.open_leg_size[repr] *= absorbed;
            }
        }
        self.init_graph_structure();
    }

    /// Precompute per-vertex leg sets and tensor sizes for the planners.
    pub fn prepare_for_optimization(&mut self) {
        debug_assert!(!self.tree_view_enabled());
        self.vertex_legs = (0..self.n).map(|v| self.vertex_legs(v, false)).collect();
        self.vertex_sizes = self
            .vertex_legs
            .iter()
            .map(|legs| self.leg_product(legs))
            .collect();
    }
}

/// Validate a spec pair and build the graph network with its tree view
/// attached.
pub(crate) fn build_with_tree_view<const W: usize>(
    graph: &NetworkSpec,
    tree: &NetworkSpec,
) -> Result<TensorNetwork<W>> {
    if tree.n != graph.n {
        return Err(Error::InvalidInput(format!(
            "tree file has {} vertices, graph has {}",
            tree.n, graph.n
        )));
    }
    if graph.n > 1 && tree.edges.len() != graph.n - 1 {
        return Err(Error::InvalidInput(format!(
            "tree file has {} edges, a spanning tree of {} vertices needs {}",
            tree.edges.len(),
            graph.n,
            graph.n - 1
        )));
    }
    let ttn = TensorNetwork::<W>::from_spec(tree);
    if graph.n > 1 && !ttn.is_tree() {
        return Err(Error::InvalidInput(
            "tree file does not describe a spanning tree".into(),
        ));
    }
    let mut tn = TensorNetwork::<W>::from_spec(graph);
    tn.set_tree_view(ttn);
    Ok(tn)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Triangle with dims 4, 5, 3 and unit open legs.
    fn triangle() -> TensorNetwork<1> {
        TensorNetwork::new(3, vec![(0, 1, 4.0), (1, 2, 5.0), (0, 2, 3.0)], &[])
    }

    /// Path 0-1-2-3 with dims 2, 3, 4.
    fn path4() -> TensorNetwork<1> {
        TensorNetwork::new(4, vec![(0, 1, 2.0), (1, 2, 3.0), (2, 3, 4.0)], &[])
    }

    #[test]
    fn test_vertex_legs() {
        let net = triangle();
        let strict = net.vertex_legs(0, true);
        assert_eq!(strict, [0, 2].into_iter().collect());
        let full = net.vertex_legs(0, false);
        assert_eq!(full, [0, 2, 3].into_iter().collect());
    }

    #[test]
    fn test_open_legs_is_boundary() {
        let net = triangle();
        // Contracting {0, 2} leaves both edges towards 1 and both open legs.
        let set: BitSet<1> = [0, 2].into_iter().collect();
        let legs = net.open_legs(&set);
        assert_eq!(legs, [0, 1, 3, 5].into_iter().collect());
    }

    #[test]
    fn test_contraction_cost_is_union_product() {
        let net = triangle();
        let a = BitSet::singleton(0);
        let b = BitSet::singleton(2);
        // Union of {e0, e2, o0} and {e1, e2, o2}: every edge once.
        assert_eq!(net.contraction_cost(&a, &b), 60.0);
        // {0, 2} against 1: the contracted edge e2 is gone, both edges
        // towards 1 survive once.
        let ab: BitSet<1> = [0, 2].into_iter().collect();
        assert_eq!(net.contraction_cost(&ab, &BitSet::singleton(1)), 20.0);
    }

    #[test]
    fn test_linear_cost_path() {
        let net = path4();
        assert_eq!(net.linear_cost(&[0, 1, 2, 3]), 6.0 + 12.0 + 4.0);
        assert_eq!(net.linear_cost(&[3, 2, 1, 0]), 12.0 + 6.0 + 2.0);
    }

    #[test]
    fn test_bushy_cost_matches_linear() {
        let net = path4();
        let sol = crate::solution::linear_as_bushy(&[0, 1, 2, 3]);
        assert_eq!(net.bushy_cost(&sol), 22.0);
    }

    #[test]
    fn test_connectivity() {
        let net = path4();
        assert!(net.is_connected(&BitSet::fill(4)));
        let gap: BitSet<1> = [0, 2].into_iter().collect();
        assert!(!net.is_connected(&gap));
        assert!(net.is_range_connected(1, 3, &[0, 1, 2, 3]));

        let disconnected = TensorNetwork::<1>::new(2, vec![], &[]);
        assert!(!disconnected.is_connected(&BitSet::fill(2)));
    }

    #[test]
    fn test_is_tree() {
        assert!(path4().is_tree());
        assert!(!triangle().is_tree());
        assert!(!TensorNetwork::<1>::new(3, vec![(0, 1, 2.0), (0, 1, 2.0)], &[]).is_tree());
    }

    #[test]
    fn test_tree_view_delegation() {
        let mut net = triangle();
        let tree = TensorNetwork::new(3, vec![(0, 1, 4.0), (1, 2, 5.0)], &[]);
        net.set_tree_view(tree);

        assert_eq!(net.vertex_legs(0, true), [0, 2].into_iter().collect());
        net.set_tree_view_enabled(true);
        // Vertex 0 touches only tree edge 0; leg products use tree dims.
        assert_eq!(net.vertex_legs(0, true), BitSet::singleton(0));
        assert_eq!(net.leg_product(&BitSet::singleton(1)), 5.0);
        net.set_tree_view_enabled(false);
        assert_eq!(net.leg_product(&BitSet::singleton(1)), 5.0);
        assert_eq!(net.leg_product(&BitSet::singleton(2)), 3.0);
    }

    #[test]
    fn test_slice_folds_boundary_edges() {
        let net = triangle();
        let ids: BitSet<1> = [0, 2].into_iter().collect();
        let slice = net.slice(&ids);
        assert_eq!(slice.vertex_count(), 2);
        assert_eq!(slice.edge_count(), 1);
        // Vertex 0 keeps its edge towards 1 (dim 4) as an open leg,
        // vertex 2 keeps dim 5.
        assert_eq!(slice.open_leg_size, vec![4.0, 5.0]);
        assert_eq!(slice.leg_dims[0], 3.0);
    }

    #[test]
    fn test_contract_subgraph() {
        let mut net = path4();
        let ids: BitSet<1> = [1, 2].into_iter().collect();
        net.contract_subgraph(&ids);
        assert_eq!(net.vertex_count(), 4);
        assert_eq!(net.edge_count(), 2);
        // Both boundary edges now point at the representative 1.
        assert_eq!(net.edges, vec![(0, 1), (3, 1)]);
        assert_eq!(net.leg_dims[..2], [2.0, 4.0]);
    }

    #[test]
    fn test_contract_subgraph_merges_parallel_bundles() {
        // Two vertices joined to a third by one edge each; contracting them
        // multiplies the bundle into a single edge.
        let mut net = TensorNetwork::<1>::new(3, vec![(0, 2, 2.0), (1, 2, 3.0)], &[]);
        let ids: BitSet<1> = [0, 1].into_iter().collect();
        net.contract_subgraph(&ids);
        assert_eq!(net.edge_count(), 1);
        assert_eq!(net.edges[0], (2, 0));
        assert_eq!(net.leg_dims[0], 6.0);
    }

    #[test]
    fn test_slice_agrees_with_contract_subgraph() {
        // The slice's total open-leg product equals the contracted
        // representative's open size times the boundary dims.
        let mut net = TensorNetwork::<1>::new(
            4,
            vec![(0, 1, 2.0), (1, 2, 3.0), (2, 3, 4.0), (1, 3, 5.0)],
            &[(1, 2.0)],
        );
        let ids: BitSet<1> = [1, 2].into_iter().collect();
        let slice = net.slice(&ids);
        let slice_open: f64 = slice.open_leg_size.iter().product();

        let boundary = net.open_legs(&ids);
        let boundary_edges: BitSet<1> = boundary.iter().filter(|&l| l < net.m).collect();
        let boundary_product = net.leg_product(&boundary_edges);

        net.contract_subgraph(&ids);
        assert_eq!(slice_open, net.open_leg_size[1] * boundary_product);
    }

    #[test]
    fn test_prepare_for_optimization() {
        let mut net = triangle();
        net.prepare_for_optimization();
        assert_eq!(net.vertex_legs[1], [0, 1, 4].into_iter().collect());
        assert_eq!(net.vertex_sizes[1], 20.0);
    }
}
