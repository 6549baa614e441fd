//! Command-line parsing for the solar rotation calibrator.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the calibration code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "solcal", version, about = "Solar rotation calibration driver for a stellar-evolution code")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the calibration loop over every seed case in a campaign.
    Calibrate(CalibrateArgs),
    /// Evaluate a single track against the solar targets, without running anything.
    Check(CheckArgs),
}

/// Options for a calibration run. Flags override the campaign file.
#[derive(Debug, Parser, Clone)]
pub struct CalibrateArgs {
    /// Campaign file (TOML) describing paths, targets and seed cases.
    #[arg(short = 'c', long, value_name = "TOML")]
    pub campaign: PathBuf,

    /// Correction rounds allowed after the initial run.
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Simulator processes run at once.
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Abort the run if one batch of simulations takes longer than this.
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Simulator executable (also read from `SOLCAL_EXECUTABLE`).
    #[arg(long)]
    pub executable: Option<PathBuf>,

    /// Leading token of generated configuration names (default: today's date).
    #[arg(long)]
    pub prefix: Option<String>,

    /// Write a JSON summary of the run.
    #[arg(long, value_name = "JSON")]
    pub summary: Option<PathBuf>,
}

/// Options for checking a single track.
#[derive(Debug, Parser, Clone)]
pub struct CheckArgs {
    /// Track file written by the simulator.
    #[arg(long, value_name = "FILE")]
    pub track: PathBuf,

    /// Target envelope angular velocity at 10 Myr (rad/s).
    #[arg(long)]
    pub w10: f64,

    /// Take targets and column layout from this campaign file.
    #[arg(short = 'c', long, value_name = "TOML")]
    pub campaign: Option<PathBuf>,

    /// Parameters the track was run with; when all six are given the
    /// correction is printed as well.
    #[command(flatten)]
    pub params: ParamArgs,
}

/// The six calibrated knobs, as optional flags.
#[derive(Debug, Parser, Clone, Default)]
pub struct ParamArgs {
    /// Mixing length (CMIXLA).
    #[arg(long)]
    pub mixing_length: Option<f64>,

    /// Envelope hydrogen fraction (XENV0A).
    #[arg(long)]
    pub hydrogen_frac: Option<f64>,

    /// Disk-locking period (PDISK).
    #[arg(long)]
    pub disk_period: Option<f64>,

    /// Initial metallicity (ZENV0A).
    #[arg(long)]
    pub metallicity: Option<f64>,

    /// Lithium-depletion efficiency (FC).
    #[arg(long)]
    pub lithium_eff: Option<f64>,

    /// Angular-momentum-loss efficiency (FK).
    #[arg(long)]
    pub loss_eff: Option<f64>,
}
