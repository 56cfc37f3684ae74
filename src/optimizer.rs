//! Algorithm dispatch and the single- and multi-threaded drivers.
//!
//! `tensor-ikkbz` and `lindp` share one driver shape: for every root of the
//! tree view, build a precedence graph, linearize it, hand the linearization
//! to a local reshaping function, and keep the globally cheapest bushy
//! solution. The parallel variants run the same per-root work on a small
//! worker pool that draws roots from an atomic counter.

use std::rc::Rc;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Barrier, Mutex};
use std::thread;

use log::debug;

use crate::bitset::BitSet;
use crate::error::{Error, Result};
use crate::greedy::run_greedy;
use crate::ikkbz::PrecedenceGraph;
use crate::lindp::run_local_lindp;
use crate::network::TensorNetwork;
use crate::plan::{Plan, PlanCache};
use crate::solution::{linear_as_bushy, RangeNode};

/// The supported contraction-order algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    TensorIkkbz,
    LinDp,
    Greedy,
    TensorIkkbzParallel,
    LinDpParallel,
}

impl Algorithm {
    /// The wire name used by the CLI and the C entry points.
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::TensorIkkbz => "tensor-ikkbz",
            Algorithm::LinDp => "lindp",
            Algorithm::Greedy => "greedy",
            Algorithm::TensorIkkbzParallel => "tensor-ikkbz-parallel",
            Algorithm::LinDpParallel => "lindp-parallel",
        }
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tensor-ikkbz" => Ok(Algorithm::TensorIkkbz),
            "lindp" => Ok(Algorithm::LinDp),
            "greedy" => Ok(Algorithm::Greedy),
            "tensor-ikkbz-parallel" => Ok(Algorithm::TensorIkkbzParallel),
            "lindp-parallel" => Ok(Algorithm::LinDpParallel),
            other => Err(Error::UnknownAlgorithm(other.to_string())),
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn log10_close(a: f64, b: f64) -> bool {
    if a == b {
        return true;
    }
    (a.log10() - b.log10()).abs() < 1e-6
}

/// Run one local optimization pass for `root` and return the bushy result.
fn optimize_root<const W: usize, F>(net: &TensorNetwork<W>, root: usize, f: &F) -> (f64, Vec<RangeNode>)
where
    F: Fn(&TensorNetwork<W>, &[usize], f64) -> (f64, Vec<RangeNode>),
{
    let mut pg = PrecedenceGraph::new(net, root);
    let (cost, order) = pg.linearize();
    let (bushy_cost, bushy) = f(net, &order, cost);
    assert!(
        bushy_cost <= cost + 1e-6,
        "bushy solution for root {root} costs {bushy_cost:e}, its linearization only {cost:e}"
    );
    (bushy_cost, bushy)
}

/// Sequential driver: best local solution over every root.
fn op_impl<const W: usize, F>(
    net: &TensorNetwork<W>,
    cache: &mut PlanCache<W>,
    name: &str,
    f: F,
) -> Rc<Plan<W>>
where
    F: Fn(&TensorNetwork<W>, &[usize], f64) -> (f64, Vec<RangeNode>),
{
    let mut min_cost = f64::INFINITY;
    let mut best_sol = Vec::new();

    for root in (0..net.vertex_count()).rev() {
        let (bushy_cost, bushy) = optimize_root(net, root, &f);
        if bushy_cost < min_cost {
            min_cost = bushy_cost;
            best_sol = bushy;
        }
    }

    debug_assert!(!net.tree_view_enabled());
    let plan = cache.translate_bushy(net, &best_sol);
    assert!(
        log10_close(plan.total_cost(), min_cost),
        "plan cost {:e} diverges from tracked minimum {min_cost:e}",
        plan.total_cost()
    );
    debug!("[{name}] cost={min_cost:e}");
    plan
}

/// Parallel driver with the same semantics as [`op_impl`]. Roots are drawn
/// from a shared counter; every worker registers its tree-view slot and
/// waits at a barrier before the first draw, so no query can observe a
/// missing flag. The best solution is folded under a mutex.
fn parallel_op_impl<const W: usize, F>(
    net: &TensorNetwork<W>,
    cache: &mut PlanCache<W>,
    name: &str,
    f: F,
    num_threads: usize,
) -> Rc<Plan<W>>
where
    F: Fn(&TensorNetwork<W>, &[usize], f64) -> (f64, Vec<RangeNode>) + Sync,
{
    let workers = if num_threads == 0 {
        thread::available_parallelism()
            .map(|p| p.get().saturating_sub(1))
            .unwrap_or(1)
            .max(1)
    } else {
        num_threads
    };
    debug!("[{name}] workers={workers}");

    let n = net.vertex_count();
    let task_index = AtomicUsize::new(0);
    let barrier = Barrier::new(workers);
    let best: Mutex<(f64, Vec<RangeNode>)> = Mutex::new((f64::INFINITY, Vec::new()));

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                net.register_thread();
                barrier.wait();
                loop {
                    let root = task_index.fetch_add(1, Ordering::SeqCst);
                    if root >= n {
                        break;
                    }
                    let (bushy_cost, bushy) = optimize_root(net, root, &f);
                    let mut guard = best.lock().unwrap();
                    if bushy_cost < guard.0 {
                        *guard = (bushy_cost, bushy);
                    }
                }
            });
        }
    });

    let (min_cost, best_sol) = best.into_inner().unwrap();
    debug_assert!(!net.tree_view_enabled());
    let plan = cache.translate_bushy(net, &best_sol);
    assert!(
        log10_close(plan.total_cost(), min_cost),
        "plan cost {:e} diverges from tracked minimum {min_cost:e}",
        plan.total_cost()
    );
    debug!("[{name}] cost={min_cost:e}");
    plan
}

/// The identity reshaping: a linearization, widened left-deep.
fn run_dummy<const W: usize>(
    _net: &TensorNetwork<W>,
    order: &[usize],
    cost: f64,
) -> (f64, Vec<RangeNode>) {
    (cost, linear_as_bushy(order))
}

fn run_lindp<const W: usize>(
    net: &TensorNetwork<W>,
    order: &[usize],
    _cost: f64,
) -> (f64, Vec<RangeNode>) {
    run_local_lindp(net, order)
}

/// Prepare the network and run the selected algorithm to a plan.
pub fn run_algorithm<const W: usize>(
    net: &mut TensorNetwork<W>,
    algorithm: Algorithm,
    num_threads: usize,
) -> Result<Rc<Plan<W>>> {
    net.prepare_for_optimization();
    if !net.is_connected(&BitSet::fill(net.vertex_count())) {
        return Err(Error::Disconnected);
    }

    let net = &*net;
    let mut cache = PlanCache::new();
    let plan = match algorithm {
        Algorithm::TensorIkkbz => op_impl(net, &mut cache, "tensor-ikkbz", run_dummy),
        Algorithm::LinDp => op_impl(net, &mut cache, "lindp", run_lindp),
        Algorithm::Greedy => run_greedy(net, &mut cache),
        Algorithm::TensorIkkbzParallel => parallel_op_impl(
            net,
            &mut cache,
            "tensor-ikkbz-parallel",
            run_dummy,
            num_threads,
        ),
        Algorithm::LinDpParallel => {
            parallel_op_impl(net, &mut cache, "lindp-parallel", run_lindp, num_threads)
        }
    };
    Ok(plan)
}
