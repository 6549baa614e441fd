//! JSON run summary.
//!
//! The summary is the machine-readable record of a calibration run: the
//! settings it ran with and the final state of every case (converged,
//! abandoned, or still failing with the correction it would have tried next).

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::calib::driver::CalibrationOutcome;
use crate::domain::{CalibrationConfig, CalibrationTargets};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub tool: String,
    pub prefix: String,
    pub executable: String,
    pub namelist_dir: String,
    pub output_dir: String,
    pub concurrency: usize,
    pub timeout_secs: Option<u64>,
    pub targets: CalibrationTargets,
    pub outcome: CalibrationOutcome,
}

impl RunSummary {
    pub fn new(config: &CalibrationConfig, outcome: &CalibrationOutcome) -> Self {
        Self {
            tool: "solcal".to_string(),
            prefix: config.prefix.clone(),
            executable: config.executable.display().to_string(),
            namelist_dir: config.namelist_dir.display().to_string(),
            output_dir: config.output_dir.display().to_string(),
            concurrency: config.concurrency,
            timeout_secs: config.timeout.map(|t| t.as_secs()),
            targets: config.targets,
            outcome: outcome.clone(),
        }
    }
}

/// Write the run summary as pretty-printed JSON.
pub fn write_summary_json(path: &Path, summary: &RunSummary) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create summary JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, summary)
        .map_err(|e| AppError::new(2, format!("Failed to write summary JSON: {e}")))?;
    Ok(())
}
