//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - sets up logging and loads `.env`
//! - loads the campaign and merges overrides
//! - runs the calibration loop
//! - prints reports and writes the optional summary

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{CalibrateArgs, CheckArgs, Command};
use crate::domain::{CalibrationTargets, ColumnMap};
use crate::error::AppError;
use crate::io::campaign::load_campaign;
use crate::io::export::{RunSummary, write_summary_json};

pub mod pipeline;

/// Entry point for the `solcal` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    init_logging();
    dotenvy::dotenv().ok();

    match cli.command {
        Command::Calibrate(args) => handle_calibrate(args),
        Command::Check(args) => handle_check(args),
    }
}

/// Logs go to stderr; `RUST_LOG` overrides the default filter.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("solcal=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn handle_calibrate(args: CalibrateArgs) -> Result<(), AppError> {
    let campaign = load_campaign(&args.campaign)?;
    let env_executable = std::env::var_os(pipeline::EXECUTABLE_ENV).map(PathBuf::from);
    let today = chrono::Local::now().format("%Y%m%d").to_string();
    let config = pipeline::build_config(&args, &campaign, env_executable, &today)?;

    let outcome = pipeline::run_calibration(&config, campaign.cases)?;

    println!("{}", crate::report::format_outcome(&outcome));

    if let Some(path) = &config.summary {
        write_summary_json(path, &RunSummary::new(&config, &outcome))?;
    }

    Ok(())
}

fn handle_check(args: CheckArgs) -> Result<(), AppError> {
    let (targets, columns) = match &args.campaign {
        Some(path) => {
            let c = load_campaign(path)?;
            (c.targets, c.columns)
        }
        None => (CalibrationTargets::default(), ColumnMap::default()),
    };

    let current = pipeline::parameters_from_args(&args.params)?;
    let check = pipeline::check_track(&args.track, args.w10, current.as_ref(), &targets, &columns)?;
    print!("{}", crate::report::format_check(&args.track, &check.convergence, &targets));
    if let Some(correction) = &check.correction {
        println!("{}", crate::report::format_correction(correction));
    }
    Ok(())
}
