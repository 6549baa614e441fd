//! Shared calibration workflow used by the CLI commands.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! campaign -> effective config -> simulator batches -> outcome
//!
//! The command handlers can then focus on presentation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use crate::calib::{Calibration, CalibrationOutcome, Convergence, Correction, evaluate, next_parameters};
use crate::cli::{CalibrateArgs, ParamArgs};
use crate::domain::{CalibrationConfig, CalibrationTargets, Case, ColumnMap, Parameters};
use crate::error::AppError;
use crate::io::campaign::Campaign;
use crate::io::track::read_curves;
use crate::runner::{BatchRunner, SimulatorRunner};

pub const DEFAULT_MAX_ITERATIONS: usize = 10;
pub const DEFAULT_CONCURRENCY: usize = 20;
/// Environment variable consulted when neither flag nor campaign names the simulator.
pub const EXECUTABLE_ENV: &str = "SOLCAL_EXECUTABLE";

/// Merge CLI flags over the campaign file over the environment.
///
/// `env_executable` and `today` are passed in so the merge stays pure.
pub fn build_config(
    args: &CalibrateArgs,
    campaign: &Campaign,
    env_executable: Option<PathBuf>,
    today: &str,
) -> Result<CalibrationConfig, AppError> {
    let executable = args
        .executable
        .clone()
        .or_else(|| campaign.executable.clone())
        .or(env_executable)
        .ok_or_else(|| {
            AppError::new(
                2,
                format!("No simulator executable: pass --executable, set [paths].executable, or set {EXECUTABLE_ENV}."),
            )
        })?;

    let max_iterations = args
        .max_iterations
        .or(campaign.max_iterations)
        .unwrap_or(DEFAULT_MAX_ITERATIONS);
    if max_iterations == 0 {
        return Err(AppError::new(2, "--max-iterations must be >= 1."));
    }

    let concurrency = args.concurrency.or(campaign.concurrency).unwrap_or(DEFAULT_CONCURRENCY);
    if concurrency == 0 {
        return Err(AppError::new(2, "--concurrency must be >= 1."));
    }

    let timeout = match args.timeout_secs.or(campaign.timeout_secs) {
        Some(0) => return Err(AppError::new(2, "--timeout-secs must be > 0.")),
        other => other.map(Duration::from_secs),
    };

    let prefix = args
        .prefix
        .clone()
        .or_else(|| campaign.prefix.clone())
        .unwrap_or_else(|| today.to_string());
    if prefix.is_empty() || prefix.contains(['/', '\\', ' ']) {
        return Err(AppError::new(2, format!("Invalid name prefix `{prefix}`.")));
    }

    Ok(CalibrationConfig {
        namelist_dir: campaign.namelist_dir.clone(),
        output_dir: campaign.output_dir.clone(),
        executable,
        prefix,
        max_iterations,
        concurrency,
        timeout,
        targets: campaign.targets,
        columns: campaign.columns,
        summary: args.summary.clone(),
    })
}

/// Run the loop with the real simulator.
pub fn run_calibration(config: &CalibrationConfig, seeds: Vec<Case>) -> Result<CalibrationOutcome, AppError> {
    let runner = SimulatorRunner::new(config.executable.clone(), config.concurrency, config.timeout);
    run_calibration_with(&runner, config, seeds)
}

/// Run the loop with any batch runner.
pub fn run_calibration_with<R: BatchRunner + ?Sized>(
    runner: &R,
    config: &CalibrationConfig,
    seeds: Vec<Case>,
) -> Result<CalibrationOutcome, AppError> {
    info!(
        cases = seeds.len(),
        max_iterations = config.max_iterations,
        prefix = %config.prefix,
        "starting calibration"
    );
    Calibration::new(runner, config).run(seeds)
}

/// Result of checking one track.
#[derive(Debug, Clone)]
pub struct TrackCheck {
    pub convergence: Convergence,
    /// Present when the current parameters were supplied.
    pub correction: Option<Correction>,
}

/// Evaluate an existing track and, given the parameters it was run with,
/// compute the correction the loop would apply.
pub fn check_track(
    track: &Path,
    w10_target: f64,
    current: Option<&Parameters>,
    targets: &CalibrationTargets,
    columns: &ColumnMap,
) -> Result<TrackCheck, AppError> {
    if !(w10_target.is_finite() && w10_target > 0.0) {
        return Err(AppError::new(2, "--w10 must be finite and > 0."));
    }
    targets.validate()?;
    let curves = read_curves(track, columns)?;
    let convergence = evaluate(&curves, targets, w10_target)?;
    let correction = match current {
        Some(p) => Some(next_parameters(&curves, p, targets, w10_target)?),
        None => None,
    };
    Ok(TrackCheck {
        convergence,
        correction,
    })
}

/// All six parameter flags, or none of them.
pub fn parameters_from_args(args: &ParamArgs) -> Result<Option<Parameters>, AppError> {
    let all = [
        args.mixing_length,
        args.hydrogen_frac,
        args.disk_period,
        args.metallicity,
        args.lithium_eff,
        args.loss_eff,
    ];
    if all.iter().all(Option::is_none) {
        return Ok(None);
    }
    match all {
        [Some(a), Some(x), Some(pdisk), Some(z), Some(fc), Some(fk)] => Ok(Some(Parameters {
            mixing_length: a,
            hydrogen_frac: x,
            disk_period: pdisk,
            metallicity: z,
            lithium_eff: fc,
            loss_eff: fk,
        })),
        _ => Err(AppError::new(
            2,
            "Give all six of --mixing-length, --hydrogen-frac, --disk-period, --metallicity, --lithium-eff, --loss-eff (or none).",
        )),
    }
}
