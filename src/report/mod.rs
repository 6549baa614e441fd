//! Reporting: per-iteration diagnostics and the end-of-run summary.

pub mod format;

pub use format::*;
