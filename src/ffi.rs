//! C entry points.
//!
//! One function per algorithm, all sharing the raw signature
//! `(n, m, edges, tree_edges, costs, tree_costs, open_costs)` where `edges`
//! and `tree_edges` are arrays of `[u, v]` pairs and `open_costs` has one
//! entry per vertex. The returned sequence is owned by the caller and must
//! be released with [`sequence_free`].
//!
//! There is no error channel in this interface: invalid input prints a
//! diagnostic to stderr and aborts the process.

use std::os::raw::{c_double, c_int};
use std::process;

use crate::io::{EdgeSpec, NetworkSpec};
use crate::solution::Solution;
use crate::Algorithm;

/// One pairwise contraction; operands are post-order ids.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Sequence {
    pub i: c_int,
    pub j: c_int,
}

/// A contraction sequence of `size` entries, ownership transferred out.
#[repr(C)]
pub struct WrappedSequence {
    pub size: c_int,
    pub result: *mut Sequence,
}

/// # Safety
///
/// `edges` must point to `m` pairs, `tree_edges` to `n - 1` pairs, `costs`
/// and `tree_costs` to matching dimension arrays, and `open_costs` to `n`
/// entries.
unsafe fn gather_specs(
    n: c_int,
    m: c_int,
    edges: *const *const c_int,
    tree_edges: *const *const c_int,
    costs: *const c_double,
    tree_costs: *const c_double,
    open_costs: *const c_double,
) -> (NetworkSpec, NetworkSpec) {
    let n = n as usize;
    let m = m as usize;

    let read_edges = |edges: *const *const c_int, dims: *const c_double, count: usize| {
        (0..count)
            .map(|k| unsafe {
                let pair = *edges.add(k);
                EdgeSpec {
                    u: *pair as usize,
                    v: *pair.add(1) as usize,
                    dim: *dims.add(k),
                }
            })
            .collect()
    };

    let open_legs: Vec<(usize, f64)> =
        (0..n).map(|v| (v, unsafe { *open_costs.add(v) })).collect();

    let graph = NetworkSpec {
        n,
        edges: read_edges(edges, costs, m),
        open_legs: open_legs.clone(),
    };
    let tree = NetworkSpec {
        n,
        edges: read_edges(tree_edges, tree_costs, n.saturating_sub(1)),
        open_legs,
    };
    (graph, tree)
}

fn emit(solution: Solution) -> WrappedSequence {
    let steps: Vec<Sequence> = solution
        .steps
        .iter()
        .map(|step| Sequence {
            i: step.left as c_int,
            j: step.right as c_int,
        })
        .collect();
    let size = steps.len() as c_int;
    let result = Box::into_raw(steps.into_boxed_slice()) as *mut Sequence;
    WrappedSequence { size, result }
}

fn die(message: &str) -> ! {
    eprintln!("tnorder: {message}");
    process::abort();
}

unsafe fn run_algorithm(
    name: &str,
    n: c_int,
    m: c_int,
    edges: *const *const c_int,
    tree_edges: *const *const c_int,
    costs: *const c_double,
    tree_costs: *const c_double,
    open_costs: *const c_double,
) -> WrappedSequence {
    let algorithm: Algorithm = match name.parse() {
        Ok(algorithm) => algorithm,
        Err(err) => die(&err.to_string()),
    };
    let (graph, tree) = gather_specs(n, m, edges, tree_edges, costs, tree_costs, open_costs);
    match crate::optimize(&graph, &tree, algorithm, 1) {
        Ok(solution) => emit(solution),
        Err(err) => die(&err.to_string()),
    }
}

macro_rules! optimizer_entry {
    ($fn_name:ident, $algorithm:literal) => {
        /// # Safety
        ///
        /// Pointer contracts as documented on the module.
        #[no_mangle]
        pub unsafe extern "C" fn $fn_name(
            n: c_int,
            m: c_int,
            edges: *const *const c_int,
            tree_edges: *const *const c_int,
            costs: *const c_double,
            tree_costs: *const c_double,
            open_costs: *const c_double,
        ) -> WrappedSequence {
            run_algorithm(
                $algorithm, n, m, edges, tree_edges, costs, tree_costs, open_costs,
            )
        }
    };
}

optimizer_entry!(tensor_ikkbz, "tensor-ikkbz");
optimizer_entry!(lindp, "lindp");
optimizer_entry!(greedy, "greedy");
optimizer_entry!(custom, "custom");
optimizer_entry!(tensor_ikkbz_parallel, "tensor-ikkbz-parallel");
optimizer_entry!(lindp_parallel, "lindp-parallel");

/// Release a sequence returned by any optimizer entry point.
///
/// # Safety
///
/// `seq` must come from this library and not have been freed before.
#[no_mangle]
pub unsafe extern "C" fn sequence_free(seq: WrappedSequence) {
    if seq.result.is_null() {
        return;
    }
    let slice = std::ptr::slice_from_raw_parts_mut(seq.result, seq.size as usize);
    drop(Box::from_raw(slice));
}
