//! `solcal` library crate.
//!
//! The binary (`solcal`) is a thin wrapper around this library so that:
//!
//! - the calibration loop is testable without spawning the simulator
//! - the convergence and correction math is reusable on its own
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod calib;
pub mod cli;
pub mod domain;
pub mod error;
pub mod io;
pub mod math;
pub mod report;
pub mod runner;
