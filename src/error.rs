//! Error types for contraction order optimization.

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced at the optimizer boundary.
///
/// Invariant violations inside the planners (cost mismatches, an infeasible
/// LinDP root interval) indicate bugs and panic instead of returning a value.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error while reading an input file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Syntactically malformed input text.
    #[error("parse error: {0}")]
    Parse(String),

    /// Structurally invalid input (bad endpoints, non-positive dimensions,
    /// a tree file that is not a spanning tree, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The network is not connected; no contraction order exists.
    #[error("tensor network is not connected")]
    Disconnected,

    /// The network needs more legs than the widest bit-set variant holds.
    #[error("network needs {required} leg slots, the widest supported variant has {limit}")]
    CapacityExceeded { required: usize, limit: usize },

    /// Unrecognized algorithm name.
    #[error("unknown algorithm `{0}`")]
    UnknownAlgorithm(String),
}
