//! Convergence testing, parameter correction and the iteration loop.

pub mod convergence;
pub mod correction;
pub mod driver;

pub use convergence::{Check, Convergence, Residuals, evaluate, is_converged, tolerance};
pub use correction::{Correction, mixing_step, next_parameters};
pub use driver::{Calibration, CalibrationOutcome, CaseReport};
