//! The calibration control loop.
//!
//! Each iteration:
//! 1) run every pending configuration as one batch (the only blocking point)
//! 2) for each case, in population order: read its track, evaluate the six
//!    tests, and either retire it (converged / abandoned) or compute a
//!    correction and write the successor configuration
//! 3) stop when the population is empty or the iteration ceiling is reached
//!
//! Iteration 0 runs the seed configurations unchanged; iterations
//! `1..=max_iterations` run corrected ones.

use std::fs;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::calib::convergence::{Check, Convergence, Residuals, evaluate};
use crate::calib::correction::{Correction, next_parameters};
use crate::domain::{CalibrationConfig, Case, CaseStatus, ConfigId, Parameters};
use crate::error::{AppError, CaseError};
use crate::io::namelist::{case_name, nml1_edits, nml2_edits};
use crate::io::patch::patch;
use crate::io::track::read_curves;
use crate::report::{fmt_params, fmt_residuals, format_case_diagnostics, format_correction};
use crate::runner::{BatchRunner, RunFailure, RunRequest};

/// Final state of one case, as reported to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseReport {
    pub label: String,
    /// Name of the last configuration that was run for this case.
    pub config: String,
    /// Iteration in which the case left the population.
    pub iteration: usize,
    pub status: CaseStatus,
    pub params: Parameters,
    pub residuals: Option<Residuals>,
    pub failed: Vec<Check>,
    /// Correction that would have been applied next (ceiling exhaustion only).
    pub suggested: Option<Parameters>,
    pub error: Option<String>,
}

/// Everything a calibration run produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationOutcome {
    pub max_iterations: usize,
    /// Simulator batches executed (initial run included).
    pub iterations_run: usize,
    pub converged: Vec<CaseReport>,
    pub abandoned: Vec<CaseReport>,
    /// Cases still pending when the ceiling was reached.
    pub not_converged: Vec<CaseReport>,
}

impl CalibrationOutcome {
    /// The population emptied before the ceiling.
    pub fn finished(&self) -> bool {
        self.not_converged.is_empty()
    }
}

enum Step {
    Converged(CaseReport),
    Continue(Case),
    Exhausted(CaseReport),
}

/// Why a case was abandoned, plus whatever was learned before it failed.
struct Abandon {
    error: CaseError,
    convergence: Option<Convergence>,
}

impl From<CaseError> for Abandon {
    fn from(error: CaseError) -> Self {
        Self {
            error,
            convergence: None,
        }
    }
}

/// Drives a population of cases to convergence.
pub struct Calibration<'a, R: BatchRunner + ?Sized> {
    runner: &'a R,
    config: &'a CalibrationConfig,
}

impl<'a, R: BatchRunner + ?Sized> Calibration<'a, R> {
    pub fn new(runner: &'a R, config: &'a CalibrationConfig) -> Self {
        Self { runner, config }
    }

    /// Run the loop over `seeds`, whose configurations must already exist on disk.
    ///
    /// Only batch-wide failures are returned as errors; everything that happens
    /// to an individual case ends up in the outcome.
    pub fn run(&self, seeds: Vec<Case>) -> Result<CalibrationOutcome, AppError> {
        self.config.targets.validate()?;
        fs::create_dir_all(&self.config.output_dir).map_err(|e| {
            AppError::new(
                2,
                format!("Failed to create output dir '{}': {e}", self.config.output_dir.display()),
            )
        })?;

        let max = self.config.max_iterations;
        let mut outcome = CalibrationOutcome {
            max_iterations: max,
            ..CalibrationOutcome::default()
        };
        let mut population = seeds;

        for iteration in 0..=max {
            if population.is_empty() {
                break;
            }
            info!(iteration, cases = population.len(), "begin iteration");

            let requests: Vec<RunRequest> = population.iter().map(|c| RunRequest::from(&c.config)).collect();
            let batch = self.runner.run_batch(&requests)?;
            outcome.iterations_run = iteration + 1;

            if population.iter().all(|c| batch.failure(&c.config.name).is_some()) {
                return Err(AppError::new(
                    5,
                    format!(
                        "Every simulator run in iteration {iteration} failed; no progress is possible. First failure: {}",
                        batch.failures.first().map(|f| f.reason.as_str()).unwrap_or("unknown")
                    ),
                ));
            }

            let last = iteration == max;
            let mut next = Vec::with_capacity(population.len());
            for case in population {
                let failure = batch.failure(&case.config.name);
                match self.advance(&case, iteration, last, failure) {
                    Ok(Step::Converged(report)) => outcome.converged.push(report),
                    Ok(Step::Continue(successor)) => next.push(successor),
                    Ok(Step::Exhausted(report)) => outcome.not_converged.push(report),
                    Err(abandon) => outcome.abandoned.push(abandoned(&case, iteration, abandon)),
                }
            }
            population = next;
        }

        if outcome.finished() {
            info!(iterations = outcome.iterations_run, "calibration finished");
        } else {
            warn!(
                remaining = outcome.not_converged.len(),
                "failed to converge after {max} iterations"
            );
        }
        Ok(outcome)
    }

    fn advance(&self, case: &Case, iteration: usize, last: bool, failure: Option<&RunFailure>) -> Result<Step, Abandon> {
        if let Some(f) = failure {
            return Err(CaseError::RunFailed(f.reason.clone()).into());
        }

        let targets = &self.config.targets;
        let curves = read_curves(&case.config.track(), &self.config.columns)?;
        let check = evaluate(&curves, targets, case.w10_target)?;

        if check.is_converged() {
            info!(case = %case.label, config = %case.config.name, iteration, "complete");
            return Ok(Step::Converged(report(case, iteration, CaseStatus::Converged, Some(&check))));
        }

        info!(
            case = %case.label,
            iteration,
            "not converged\n{}",
            format_case_diagnostics(&case.config.track(), &check)
        );

        let correction = next_parameters(&curves, &case.params, targets, case.w10_target).map_err(|error| Abandon {
            error,
            convergence: Some(check.clone()),
        })?;
        info!(case = %case.label, "correction\n{}", format_correction(&correction));

        if last {
            let mut r = report(case, iteration, CaseStatus::Pending, Some(&check));
            r.suggested = Some(correction.params);
            warn!(
                case = %case.label,
                failed = ?check.failed,
                "iteration ceiling reached without convergence"
            );
            return Ok(Step::Exhausted(r));
        }

        let successor = self.materialize(case, iteration + 1, &correction).map_err(|error| Abandon {
            error,
            convergence: Some(check),
        })?;
        Ok(Step::Continue(successor))
    }

    /// Write the successor's namelists and return the successor case.
    fn materialize(&self, case: &Case, iteration: usize, correction: &Correction) -> Result<Case, CaseError> {
        let name = case_name(&self.config.prefix, iteration, &case.label, &correction.params);
        let config = ConfigId::new(name, &self.config.namelist_dir, &self.config.output_dir);

        let r1 = patch(
            &case.config.nml1(),
            &config.nml1(),
            &nml1_edits(&correction.params, &config.output),
        )?;
        let r2 = patch(&case.config.nml2(), &config.nml2(), &nml2_edits(&correction.params))?;

        let unmatched: Vec<&String> = r1.unmatched.iter().chain(r2.unmatched.iter()).collect();
        if !unmatched.is_empty() {
            warn!(case = %case.label, keys = ?unmatched, "namelist keys not found; left unchanged");
        }

        Ok(case.successor(config, correction.params))
    }
}

fn report(case: &Case, iteration: usize, status: CaseStatus, check: Option<&Convergence>) -> CaseReport {
    CaseReport {
        label: case.label.clone(),
        config: case.config.name.clone(),
        iteration,
        status,
        params: case.params,
        residuals: check.map(|c| c.residuals),
        failed: check.map(|c| c.failed.clone()).unwrap_or_default(),
        suggested: None,
        error: None,
    }
}

fn abandoned(case: &Case, iteration: usize, abandon: Abandon) -> CaseReport {
    warn!(
        case = %case.label,
        config = %case.config.name,
        iteration,
        error = %abandon.error,
        params = %fmt_params(&case.params),
        residuals = %abandon.convergence.as_ref().map(|c| fmt_residuals(&c.residuals)).unwrap_or_default(),
        "case abandoned"
    );
    let mut r = report(case, iteration, CaseStatus::Abandoned, abandon.convergence.as_ref());
    r.error = Some(abandon.error.to_string());
    r
}
