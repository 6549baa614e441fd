//! Campaign file (TOML) loading and validation.
//!
//! A campaign names where namelists and outputs live, the simulator, the run
//! limits, and the seed cases (typically one per rotation percentile):
//!
//! ```toml
//! [paths]
//! namelist_dir = "nml"
//! output_dir = "tracks"
//! executable = "../../model5.0"
//!
//! [run]
//! max_iterations = 10
//! concurrency = 20
//!
//! [start]
//! mixing_length = 1.91081247
//! hydrogen_frac = 0.710664867
//! metallicity = 0.0188
//! lithium_eff = 0.98
//! loss_eff = 6.8
//!
//! [[case]]
//! label = "p90"
//! namelist = "nml/seed_p90"
//! w10 = 4.78057e-05
//! disk_period = 4.46171e-06
//! ```
//!
//! Relative paths are resolved against the campaign file's directory.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::domain::{CalibrationTargets, Case, ColumnMap, ConfigId, Parameters};
use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct CampaignFile {
    paths: PathsSection,
    #[serde(default)]
    run: RunSection,
    #[serde(default)]
    targets: CalibrationTargets,
    #[serde(default)]
    columns: ColumnMap,
    #[serde(default)]
    start: StartSection,
    #[serde(rename = "case", default)]
    cases: Vec<CaseSeed>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct PathsSection {
    namelist_dir: PathBuf,
    output_dir: PathBuf,
    executable: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunSection {
    prefix: Option<String>,
    max_iterations: Option<usize>,
    concurrency: Option<usize>,
    timeout_secs: Option<u64>,
}

/// Starting values shared by every seed unless the seed overrides them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StartSection {
    mixing_length: Option<f64>,
    hydrogen_frac: Option<f64>,
    disk_period: Option<f64>,
    metallicity: Option<f64>,
    lithium_eff: Option<f64>,
    loss_eff: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct CaseSeed {
    label: String,
    /// Namelist stem of the already-run seed configuration.
    namelist: PathBuf,
    /// Target envelope angular velocity at 10 Myr.
    w10: f64,
    mixing_length: Option<f64>,
    hydrogen_frac: Option<f64>,
    disk_period: Option<f64>,
    metallicity: Option<f64>,
    lithium_eff: Option<f64>,
    loss_eff: Option<f64>,
}

/// A loaded campaign. Run limits stay optional so CLI flags can fill them.
#[derive(Debug, Clone)]
pub struct Campaign {
    pub namelist_dir: PathBuf,
    pub output_dir: PathBuf,
    pub executable: Option<PathBuf>,
    pub prefix: Option<String>,
    pub max_iterations: Option<usize>,
    pub concurrency: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub targets: CalibrationTargets,
    pub columns: ColumnMap,
    /// Seed population, in file order.
    pub cases: Vec<Case>,
}

/// Read and validate a campaign file.
pub fn load_campaign(path: &Path) -> Result<Campaign, AppError> {
    let text = fs::read_to_string(path)
        .map_err(|e| AppError::new(2, format!("Failed to read campaign '{}': {e}", path.display())))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    parse_campaign(&text, base)
}

fn parse_campaign(text: &str, base: &Path) -> Result<Campaign, AppError> {
    let file: CampaignFile =
        toml::from_str(text).map_err(|e| AppError::new(2, format!("Invalid campaign file: {e}")))?;

    file.targets.validate()?;

    let namelist_dir = resolve(base, &file.paths.namelist_dir);
    let output_dir = resolve(base, &file.paths.output_dir);

    if file.cases.is_empty() {
        return Err(AppError::new(2, "Campaign defines no `[[case]]` seeds."));
    }

    let mut seen = HashSet::new();
    let mut cases = Vec::with_capacity(file.cases.len());
    for seed in &file.cases {
        validate_label(&seed.label)?;
        if !seen.insert(seed.label.as_str()) {
            return Err(AppError::new(2, format!("Duplicate case label `{}`.", seed.label)));
        }
        if !(seed.w10.is_finite() && seed.w10 > 0.0) {
            return Err(AppError::new(
                2,
                format!("Case `{}`: `w10` must be finite and > 0.", seed.label),
            ));
        }

        let params = seed_parameters(seed, &file.start)?;
        let stem = resolve(base, &seed.namelist);
        let name = stem
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| AppError::new(2, format!("Case `{}`: `namelist` has no file name.", seed.label)))?;
        let config = ConfigId {
            output: output_dir.join(&name),
            namelist: stem,
            name,
        };
        cases.push(Case::seed(seed.label.clone(), config, params, seed.w10));
    }

    if file.run.max_iterations == Some(0) {
        return Err(AppError::new(2, "`max_iterations` must be >= 1."));
    }
    if file.run.concurrency == Some(0) {
        return Err(AppError::new(2, "`concurrency` must be >= 1."));
    }

    Ok(Campaign {
        namelist_dir,
        output_dir,
        executable: file.paths.executable.map(|p| resolve_executable(base, &p)),
        prefix: file.run.prefix,
        max_iterations: file.run.max_iterations,
        concurrency: file.run.concurrency,
        timeout_secs: file.run.timeout_secs,
        targets: file.targets,
        columns: file.columns,
        cases,
    })
}

fn seed_parameters(seed: &CaseSeed, start: &StartSection) -> Result<Parameters, AppError> {
    let pick = |own: Option<f64>, shared: Option<f64>, name: &str| -> Result<f64, AppError> {
        let v = own.or(shared).ok_or_else(|| {
            AppError::new(
                2,
                format!("Case `{}`: no `{name}` (set it on the case or in `[start]`).", seed.label),
            )
        })?;
        if !v.is_finite() {
            return Err(AppError::new(2, format!("Case `{}`: `{name}` must be finite.", seed.label)));
        }
        Ok(v)
    };

    Ok(Parameters {
        mixing_length: pick(seed.mixing_length, start.mixing_length, "mixing_length")?,
        hydrogen_frac: pick(seed.hydrogen_frac, start.hydrogen_frac, "hydrogen_frac")?,
        disk_period: pick(seed.disk_period, start.disk_period, "disk_period")?,
        metallicity: pick(seed.metallicity, start.metallicity, "metallicity")?,
        lithium_eff: pick(seed.lithium_eff, start.lithium_eff, "lithium_eff")?,
        loss_eff: pick(seed.loss_eff, start.loss_eff, "loss_eff")?,
    })
}

fn validate_label(label: &str) -> Result<(), AppError> {
    let ok = !label.is_empty()
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    if ok {
        Ok(())
    } else {
        Err(AppError::new(
            2,
            format!("Invalid case label `{label}` (use ASCII letters, digits, `-` or `.`)."),
        ))
    }
}

fn resolve(base: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() { p.to_path_buf() } else { base.join(p) }
}

/// Bare command names (`model5.0`) are left for `PATH` lookup.
fn resolve_executable(base: &Path, p: &Path) -> PathBuf {
    if p.components().count() > 1 { resolve(base, p) } else { p.to_path_buf() }
}
