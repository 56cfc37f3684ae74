//! Command-line front end.
//!
//! Run with: `tnorder <algorithm> [graph-file tree-file]`

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use tnorder::{optimize, read_network, Algorithm};

#[derive(Parser)]
#[command(
    name = "tnorder",
    about = "Contraction order optimization for tensor networks"
)]
struct Cli {
    /// Algorithm: tensor-ikkbz, lindp, greedy, tensor-ikkbz-parallel or
    /// lindp-parallel
    algorithm: String,

    /// Graph input file
    #[arg(default_value = "../graph.in")]
    graph: PathBuf,

    /// Spanning-tree input file
    #[arg(default_value = "../tree.in")]
    tree: PathBuf,

    /// Worker threads for the parallel algorithms (0 = all cores but one)
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Write the solution as JSON to this file
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let algorithm: Algorithm = cli.algorithm.parse()?;
    let graph = read_network(&cli.graph)
        .with_context(|| format!("failed to read graph file {}", cli.graph.display()))?;
    let tree = read_network(&cli.tree)
        .with_context(|| format!("failed to read tree file {}", cli.tree.display()))?;
    info!(
        "n={} m={} algorithm={algorithm}",
        graph.n,
        graph.edges.len()
    );

    let start = Instant::now();
    let solution = optimize(&graph, &tree, algorithm, cli.threads)?;
    let elapsed = start.elapsed();
    info!("optimized in {:.2} ms", elapsed.as_secs_f64() * 1e3);

    if let Some(path) = &cli.output {
        let report = serde_json::json!({
            "algorithm": algorithm.name(),
            "n": graph.n,
            "m": graph.edges.len(),
            "cost": solution.cost,
            "elapsed_ms": elapsed.as_secs_f64() * 1e3,
            "steps": solution.steps,
        });
        fs::write(path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    println!("[{algorithm}] cost={}", solution.cost);
    Ok(())
}
