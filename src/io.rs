//! Parsing of the text input format.
//!
//! Both input files share one whitespace-separated layout: a header
//! `n m o`, then `m` edge records `u v dim`, then `o` open-leg records
//! `u dim`. Vertices without an open-leg record default to dimension 1.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One internal edge of a network spec.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub u: usize,
    pub v: usize,
    pub dim: f64,
}

/// A parsed, validated network description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub n: usize,
    pub edges: Vec<EdgeSpec>,
    /// Explicit open-leg dimensions; unlisted vertices default to 1.
    pub open_legs: Vec<(usize, f64)>,
}

impl NetworkSpec {
    /// Validate endpoints and dimensions.
    pub fn validate(&self) -> Result<()> {
        if self.n == 0 {
            return Err(Error::InvalidInput("network has no vertices".into()));
        }
        for (index, edge) in self.edges.iter().enumerate() {
            if edge.u >= self.n || edge.v >= self.n {
                return Err(Error::InvalidInput(format!(
                    "edge {index} connects {} and {}, vertices go up to {}",
                    edge.u,
                    edge.v,
                    self.n - 1
                )));
            }
            if edge.u == edge.v {
                return Err(Error::InvalidInput(format!(
                    "edge {index} is a self-loop on vertex {}",
                    edge.u
                )));
            }
            if !(edge.dim > 0.0) || !edge.dim.is_finite() {
                return Err(Error::InvalidInput(format!(
                    "edge {index} has non-positive dimension {}",
                    edge.dim
                )));
            }
        }
        for &(v, dim) in &self.open_legs {
            if v >= self.n {
                return Err(Error::InvalidInput(format!(
                    "open leg names vertex {v}, vertices go up to {}",
                    self.n - 1
                )));
            }
            if !(dim > 0.0) || !dim.is_finite() {
                return Err(Error::InvalidInput(format!(
                    "open leg of vertex {v} has non-positive dimension {dim}"
                )));
            }
        }
        Ok(())
    }
}

struct Tokens<'a> {
    iter: std::str::SplitWhitespace<'a>,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            iter: text.split_whitespace(),
        }
    }

    fn next(&mut self, what: &str) -> Result<&'a str> {
        self.iter
            .next()
            .ok_or_else(|| Error::Parse(format!("unexpected end of input, expected {what}")))
    }

    fn parse_usize(&mut self, what: &str) -> Result<usize> {
        let tok = self.next(what)?;
        tok.parse()
            .map_err(|_| Error::Parse(format!("expected {what}, got `{tok}`")))
    }

    fn parse_f64(&mut self, what: &str) -> Result<f64> {
        let tok = self.next(what)?;
        tok.parse()
            .map_err(|_| Error::Parse(format!("expected {what}, got `{tok}`")))
    }
}

/// Parse a network description from text.
pub fn parse_network(text: &str) -> Result<NetworkSpec> {
    let mut tokens = Tokens::new(text);
    let n = tokens.parse_usize("vertex count")?;
    let m = tokens.parse_usize("edge count")?;
    let o = tokens.parse_usize("open-leg count")?;

    let mut edges = Vec::with_capacity(m);
    for _ in 0..m {
        let u = tokens.parse_usize("edge endpoint")?;
        let v = tokens.parse_usize("edge endpoint")?;
        let dim = tokens.parse_f64("edge dimension")?;
        edges.push(EdgeSpec { u, v, dim });
    }

    let mut open_legs = Vec::with_capacity(o);
    for _ in 0..o {
        let v = tokens.parse_usize("open-leg vertex")?;
        let dim = tokens.parse_f64("open-leg dimension")?;
        open_legs.push((v, dim));
    }

    let spec = NetworkSpec { n, edges, open_legs };
    spec.validate()?;
    Ok(spec)
}

/// Read and parse a network file.
pub fn read_network<P: AsRef<Path>>(path: P) -> Result<NetworkSpec> {
    let text = fs::read_to_string(path)?;
    parse_network(&text)
}
