//! Batch execution: one independent generation per run.

use anyhow::Context;
use rayon::prelude::*;
use serde::Serialize;
use std::{fs, path::Path};
use tissue_core::{
    Coefficient, GeneratorConfig, TissueError, TissueVolume, filters::log10_image,
    generate_phantom, generate_tissue, volume::PropertyValue,
};
use tracing::{error, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeneratorKind {
    Random,
    Phantom,
}

#[derive(Clone, Debug)]
pub struct BatchPlan {
    pub runs: u32,
    pub base_seed: Option<u64>,
    pub kind: GeneratorKind,
    pub parallel: bool,
}

/// What one finished run looked like.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    pub run: u32,
    pub seed: Option<String>,
    pub dims: [usize; 3],
    pub spacing_mm: f64,
    pub vessel_fraction: f64,
    pub absorption_min: f64,
    pub absorption_max: f64,
    pub log10_absorption_min: f64,
    pub log10_absorption_max: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed(RunSummary),
    Failed { run: u32, error: String },
}

/// Loads a configuration file, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<GeneratorConfig> {
    let Some(path) = path else {
        return Ok(GeneratorConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    parse_config(&text).with_context(|| format!("parsing config file {}", path.display()))
}

pub fn parse_config(text: &str) -> anyhow::Result<GeneratorConfig> {
    Ok(toml::from_str(text)?)
}

/// Runs every planned generation; a failing run never stops the others.
///
/// Run `i` gets seed `base_seed + i`, so each run owns its RNG stream and
/// results do not depend on `parallel`.
pub fn run_batch(config: &GeneratorConfig, plan: &BatchPlan) -> Vec<RunOutcome> {
    let job = |run: u32| {
        let mut cfg = config.clone();
        if let Some(base) = plan.base_seed {
            cfg.seed = Some(base.wrapping_add(u64::from(run)));
        }

        match run_one(&cfg, plan.kind, run) {
            Ok(summary) => {
                info!(
                    "run {run} done: seed {}, vessel fraction {:.4}",
                    summary.seed.as_deref().unwrap_or("?"),
                    summary.vessel_fraction
                );
                RunOutcome::Completed(summary)
            }
            Err(err) => {
                error!("run {run} failed: {err}");
                RunOutcome::Failed {
                    run,
                    error: err.to_string(),
                }
            }
        }
    };

    if plan.parallel {
        (0..plan.runs).into_par_iter().map(job).collect()
    } else {
        (0..plan.runs).map(job).collect()
    }
}

pub fn run_one(config: &GeneratorConfig, kind: GeneratorKind, run: u32) -> Result<RunSummary, TissueError> {
    let volume = match kind {
        GeneratorKind::Random => generate_tissue(config),
        GeneratorKind::Phantom => generate_phantom(config)?,
    };
    summarize(run, &volume)
}

/// Summarizes a volume; fails when its absorption cannot be log-scaled.
fn summarize(run: u32, volume: &TissueVolume) -> Result<RunSummary, TissueError> {
    let absorption = volume.coefficient(Coefficient::Absorption);
    let (absorption_min, absorption_max) = min_max(absorption.iter().copied());

    let mut log_absorption = absorption.to_owned();
    log10_image(&mut log_absorption)?;
    let (log10_absorption_min, log10_absorption_max) = min_max(log_absorption.iter().copied());

    let seed = match volume.property("generator.seed") {
        Some(PropertyValue::Text(seed)) => Some(seed.clone()),
        Some(PropertyValue::Number(seed)) => Some(seed.to_string()),
        None => None,
    };

    Ok(RunSummary {
        run,
        seed,
        dims: volume.dims(),
        spacing_mm: volume.spacing(),
        vessel_fraction: volume.vessel_fraction(),
        absorption_min,
        absorption_max,
        log10_absorption_min,
        log10_absorption_max,
    })
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
}
