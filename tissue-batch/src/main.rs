//! Batch driver for synthetic tissue generation.
//!
//! Runs a number of independent generations, each with its own RNG
//! stream, and prints one JSON summary line per run to stdout. Logging
//! goes to stderr and honours `RUST_LOG`.

mod runner;

use clap::Parser;
use runner::{BatchPlan, GeneratorKind, RunOutcome};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tissue-batch", version, about = "Generate batches of synthetic tissue volumes")]
struct Args {
    /// Number of volumes to generate.
    #[arg(long, default_value_t = 1)]
    runs: u32,

    /// Base seed; run `i` uses `seed + i`. Unset draws a fresh seed per run.
    #[arg(long)]
    seed: Option<u64>,

    /// TOML file overriding the default generator configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Generate deterministic validation phantoms instead of random tissue.
    #[arg(long)]
    phantom: bool,

    /// Distribute runs over all cores.
    #[arg(long)]
    parallel: bool,
}

/// Parses arguments, runs the batch and reports the outcome of each run.
///
/// ### Returns
/// - `Ok(())` once every run has been attempted, even if some failed.
/// - `Err` if the configuration cannot be loaded or is invalid.
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = runner::load_config(args.config.as_deref())?;
    config.validate()?;

    let plan = BatchPlan {
        runs: args.runs,
        base_seed: args.seed,
        kind: if args.phantom {
            GeneratorKind::Phantom
        } else {
            GeneratorKind::Random
        },
        parallel: args.parallel,
    };
    info!("starting batch: {plan:?}");

    let outcomes = runner::run_batch(&config, &plan);
    for outcome in &outcomes {
        println!("{}", serde_json::to_string(outcome)?);
    }

    let failed = outcomes
        .iter()
        .filter(|o| matches!(o, RunOutcome::Failed { .. }))
        .count();
    if failed > 0 {
        warn!("{failed} of {} runs failed", outcomes.len());
    } else {
        info!("all {} runs completed", outcomes.len());
    }
    Ok(())
}
