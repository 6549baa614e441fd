//! Domain types used throughout the calibration.
//!
//! This module defines:
//!
//! - the calibrated parameter vector (`Parameters`) and per-case state (`Case`)
//! - process-wide targets and tolerances (`CalibrationTargets`)
//! - track-file column positions (`ColumnMap`) and parsed output (`CurveSet`)

pub mod types;

pub use types::*;
