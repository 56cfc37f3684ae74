//! TensorIKKBZ: spanning-tree linearization by rank.
//!
//! For a fixed root, the spanning tree is read as a precedence graph whose
//! nodes carry a rational *rank*. A polymatroid-style sweep visits the tree
//! leaves first, merges every child's chain through a heap keyed by
//! head-of-chain rank, and absorbs chain heads into their ancestor while the
//! ancestor's rank exceeds theirs. Walking the root's chain afterwards gives
//! a linear contraction order whose cost the driver then evaluates on the
//! full graph.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use crate::bitset::BitSet;
use crate::network::TensorNetwork;

struct Node<const W: usize> {
    /// Edge towards the parent; `None` at the root.
    incoming_edge: Option<usize>,
    /// Open-leg size of this (compound) node.
    open_size: f64,
    /// Remaining legs towards the rest of the tree, incoming edge excluded.
    outer_legs: BitSet<W>,
    /// Accumulated cost, the numerator of the rank.
    acc: f64,
    /// Prefix of `chain` already absorbed into this node.
    contracted: usize,
    children: Vec<usize>,
    /// Descendant vertices in rank order, after this node's normalization.
    chain: Vec<usize>,
    /// Vertices this node represents after absorbing rank violators.
    compound: Vec<usize>,
}

impl<const W: usize> Node<W> {
    /// The rank as a `(numerator, denominator)` pair. Compared by raw
    /// cross-multiplication; the denominator may be zero or negative and is
    /// deliberately not sign-normalized.
    fn rank(&self, net: &TensorNetwork<W>) -> (f64, f64) {
        let edge = self
            .incoming_edge
            .expect("rank is undefined for the root node");
        let den = net.edge_dim(edge) - self.open_size * net.leg_product(&self.outer_legs);
        (self.acc, den)
    }
}

fn rank_exceeds(a: (f64, f64), b: (f64, f64)) -> bool {
    a.0 * b.1 > b.0 * a.1
}

/// Heap entry: the rank of a chain head, captured when the slot is pushed.
/// Inverted ordering turns `BinaryHeap` into a min-heap by rank.
struct HeadRank {
    num: f64,
    den: f64,
    slot: usize,
}

impl PartialEq for HeadRank {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeadRank {}

impl PartialOrd for HeadRank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeadRank {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.num * self.den)
            .partial_cmp(&(self.num * other.den))
            .unwrap_or(Ordering::Equal)
    }
}

/// The rooted precedence graph of one TensorIKKBZ run.
pub struct PrecedenceGraph<'n, const W: usize> {
    net: &'n TensorNetwork<W>,
    nodes: Vec<Node<W>>,
    /// BFS order over the tree view; index 0 is the root.
    bfs: Vec<usize>,
    root: usize,
}

impl<'n, const W: usize> PrecedenceGraph<'n, W> {
    /// Build the precedence graph rooted at `root`. Turns the calling
    /// thread's tree view on; [`linearize`](Self::linearize) turns it off.
    pub fn new(net: &'n TensorNetwork<W>, root: usize) -> Self {
        net.set_tree_view_enabled(true);
        let tree = net.tree_view().expect("precedence graph needs a tree view");
        let n = net.vertex_count();

        let mut nodes: Vec<Node<W>> = (0..n)
            .map(|_| Node {
                incoming_edge: None,
                open_size: 1.0,
                outer_legs: BitSet::new(),
                acc: 0.0,
                contracted: 0,
                children: Vec::new(),
                chain: Vec::new(),
                compound: Vec::new(),
            })
            .collect();

        nodes[root].open_size = net.open_leg_size[root];
        nodes[root].outer_legs = net.vertex_legs(root, true);
        nodes[root].acc = nodes[root].open_size * net.leg_product(&nodes[root].outer_legs);

        let mut bfs = Vec::with_capacity(n);
        let mut seen: BitSet<W> = BitSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(root);
        while let Some(curr) = queue.pop_front() {
            bfs.push(curr);
            seen.insert(curr);
            for &(v, edge_id) in &tree.adj[curr] {
                if seen.contains(v) {
                    continue;
                }
                nodes[curr].children.push(v);
                nodes[v].incoming_edge = Some(edge_id);
                nodes[v].open_size = net.open_leg_size[v];
                nodes[v].outer_legs = net.vertex_legs(v, true).without(edge_id);
                nodes[v].acc =
                    nodes[v].open_size * net.leg_product(&nodes[v].outer_legs.with(edge_id));
                queue.push_back(v);
            }
        }
        assert_eq!(bfs.len(), n, "tree view does not span the network");

        Self {
            net,
            nodes,
            bfs,
            root,
        }
    }

    /// Run the TensorIKKBZ sweep and return the linearization together with
    /// its linear cost on the graph view.
    pub fn linearize(&mut self) -> (f64, Vec<usize>) {
        let net = self.net;
        let n = net.vertex_count();

        for index in (0..n).rev() {
            let curr = self.bfs[index];
            self.nodes[curr].compound.push(curr);
            if self.nodes[curr].children.is_empty() {
                continue;
            }
            self.merge_child_chains(curr);
            if curr == self.root {
                break;
            }
            self.absorb_violators(curr);
        }

        let mut order = Vec::with_capacity(n);
        order.push(self.root);
        for i in 0..self.nodes[self.root].chain.len() {
            let link = self.nodes[self.root].chain[i];
            order.extend_from_slice(&self.nodes[link].compound);
        }
        assert_eq!(order.len(), n);

        net.set_tree_view_enabled(false);
        (net.linear_cost(&order), order)
    }

    /// Interleave the children's chains into `curr`'s chain, smallest head
    /// rank first. Each heap slot tracks one child; its head is the child
    /// itself until the first pop, then successive chain entries past the
    /// already-contracted prefix.
    fn merge_child_chains(&mut self, curr: usize) {
        let children = self.nodes[curr].children.clone();
        let mut pointer: Vec<Option<usize>> = vec![None; children.len()];
        let mut heap = BinaryHeap::with_capacity(children.len());
        for (slot, &child) in children.iter().enumerate() {
            let (num, den) = self.nodes[child].rank(self.net);
            heap.push(HeadRank { num, den, slot });
        }

        while let Some(HeadRank { slot, .. }) = heap.pop() {
            let child = children[slot];
            let head = match pointer[slot] {
                None => child,
                Some(p) => self.nodes[child].chain[p],
            };
            self.nodes[curr].chain.push(head);

            match pointer[slot] {
                None => {
                    let c = &self.nodes[child];
                    // A leaf child, or one whose whole chain was already
                    // absorbed into it, is exhausted after its own entry.
                    if c.chain.is_empty() || c.contracted == c.chain.len() {
                        continue;
                    }
                    pointer[slot] = Some(c.contracted);
                }
                Some(p) => {
                    if p + 1 == self.nodes[child].chain.len() {
                        continue;
                    }
                    pointer[slot] = Some(p + 1);
                }
            }

            let next = self.nodes[child].chain[pointer[slot].unwrap()];
            let (num, den) = self.nodes[next].rank(self.net);
            heap.push(HeadRank { num, den, slot });
        }
    }

    /// Absorb chain heads into `curr` while `curr`'s rank exceeds theirs.
    fn absorb_violators(&mut self, curr: usize) {
        self.nodes[curr].contracted = 0;
        let mut i = 0;
        while i < self.nodes[curr].chain.len() {
            let next = self.nodes[curr].chain[i];
            if !rank_exceeds(
                self.nodes[curr].rank(self.net),
                self.nodes[next].rank(self.net),
            ) {
                break;
            }
            let next_edge = self.nodes[next]
                .incoming_edge
                .expect("chain entries are never the root");

            let outer_wo_next = self.nodes[curr].outer_legs.without(next_edge);
            let absorbed_acc = self.nodes[curr].open_size
                * self.net.leg_product(&outer_wo_next)
                * self.nodes[next].acc;
            self.nodes[curr].acc += absorbed_acc;

            let toggled = self.nodes[next].outer_legs.with(next_edge);
            let next_open = self.nodes[next].open_size;
            self.nodes[curr].outer_legs ^= toggled;
            self.nodes[curr].open_size *= next_open;
            self.nodes[curr].contracted += 1;

            let absorbed = self.nodes[next].compound.clone();
            self.nodes[curr].compound.extend(absorbed);
            i += 1;
        }
    }
}
