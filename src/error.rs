use std::path::PathBuf;

use thiserror::Error;

/// Fatal, process-level error: carries the exit code `main` returns.
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Failure scoped to a single calibration case.
///
/// None of these stop the loop: the case is abandoned and the remaining
/// population carries on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaseError {
    /// A namelist could not be read, or its patched copy could not be written.
    #[error("configuration error for '{}': {message}", path.display())]
    Configuration { path: PathBuf, message: String },

    /// The result file is absent or has too few usable rows.
    #[error("missing result '{}': {message}", path.display())]
    MissingResult { path: PathBuf, message: String },

    /// The result file parsed, but its contents are physically unusable.
    #[error("degenerate input in '{}': {message}", path.display())]
    DegenerateInput { path: PathBuf, message: String },

    /// Interpolating a quantity produced no finite value.
    #[error("cannot interpolate {quantity} at age {age}")]
    Interpolation { quantity: &'static str, age: f64 },

    /// A correction formula divided by (near) zero or produced a non-finite value.
    #[error("degenerate correction: {0}")]
    DegenerateCorrection(String),

    /// The simulator did not produce a result for this case.
    #[error("simulation run failed: {0}")]
    RunFailed(String),
}

impl From<CaseError> for AppError {
    fn from(err: CaseError) -> Self {
        let code = match err {
            CaseError::Configuration { .. } => 2,
            CaseError::MissingResult { .. } | CaseError::DegenerateInput { .. } => 3,
            CaseError::Interpolation { .. }
            | CaseError::DegenerateCorrection(_)
            | CaseError::RunFailed(_) => 4,
        };
        AppError::new(code, err.to_string())
    }
}
