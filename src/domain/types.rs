//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - carried through the calibration loop in-memory
//! - loaded from the campaign TOML file
//! - exported in the JSON run summary

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// The six physical/numerical knobs the calibration adjusts.
///
/// Field names follow what each knob means; the namelist key they land in is
/// noted per field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    /// Mixing-length parameter α (`CMIXLA`).
    pub mixing_length: f64,
    /// Envelope hydrogen mass fraction X (`XENV0A`, `RSCLX`).
    pub hydrogen_frac: f64,
    /// Disk-locking period (`PDISK`).
    pub disk_period: f64,
    /// Initial envelope metallicity Z (`ZENV0A`, `RSCLZ`).
    pub metallicity: f64,
    /// Lithium-depletion mixing efficiency (`FC`).
    pub lithium_eff: f64,
    /// Angular-momentum-loss efficiency (`FK`).
    pub loss_eff: f64,
}

impl Parameters {
    pub fn is_finite(&self) -> bool {
        [
            self.mixing_length,
            self.hydrogen_frac,
            self.disk_period,
            self.metallicity,
            self.lithium_eff,
            self.loss_eff,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// Where a case's simulator inputs and outputs live.
///
/// A configuration is the pair of namelists `<namelist>.nml1` / `<namelist>.nml2`;
/// the simulator writes `<output>.track` (and friends) next to `output`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigId {
    /// Name shared by the namelists and the outputs (no directory, no extension).
    pub name: String,
    /// Namelist stem (`namelist_dir/name`).
    pub namelist: PathBuf,
    /// Output stem (`output_dir/name`).
    pub output: PathBuf,
}

impl ConfigId {
    pub fn new(name: impl Into<String>, namelist_dir: &Path, output_dir: &Path) -> Self {
        let name = name.into();
        Self {
            namelist: namelist_dir.join(&name),
            output: output_dir.join(&name),
            name,
        }
    }

    /// First namelist (composition, mixing length, output file names).
    pub fn nml1(&self) -> PathBuf {
        with_suffix(&self.namelist, ".nml1")
    }

    /// Second namelist (rotation and lithium physics).
    pub fn nml2(&self) -> PathBuf {
        with_suffix(&self.namelist, ".nml2")
    }

    /// Evolutionary track written by the simulator.
    pub fn track(&self) -> PathBuf {
        with_suffix(&self.output, ".track")
    }

    /// Captured stdout/stderr of the simulator run.
    pub fn log(&self) -> PathBuf {
        with_suffix(&self.output, ".log")
    }
}

/// Append a suffix to a path without touching any dots already in the file name.
///
/// Generated names embed formatted floats (`PDISK_4.46171e-06`), so
/// `Path::with_extension` would truncate them.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

/// Lifecycle state of a case as it leaves the population.
///
/// A live `Case` is always pending; the terminal state is recorded on the
/// case's report when it is retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Pending,
    Converged,
    Abandoned,
}

/// One independently tracked calibration run.
///
/// A case is replaced (never edited) between iterations; `label` and
/// `w10_target` are copied forward unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    /// Stable, unique name for the seed this case descends from (e.g. `p90`).
    pub label: String,
    pub config: ConfigId,
    pub params: Parameters,
    /// Envelope angular velocity the case must reach at 10 Myr (rad/s).
    pub w10_target: f64,
}

impl Case {
    pub fn seed(label: impl Into<String>, config: ConfigId, params: Parameters, w10_target: f64) -> Self {
        Self {
            label: label.into(),
            config,
            params,
            w10_target,
        }
    }

    /// Successor case for the next iteration.
    pub fn successor(&self, config: ConfigId, params: Parameters) -> Self {
        Self {
            label: self.label.clone(),
            config,
            params,
            w10_target: self.w10_target,
        }
    }
}

/// Observational targets, sensitivities and tolerances.
///
/// Constant for the whole run. Ages are in Gyr, periods in days,
/// angular velocities in rad/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationTargets {
    /// Age at which the present-day Sun is compared (Gyr).
    pub solar_age: f64,
    /// Age at which the early rotation rate is compared (10 Myr).
    pub reference_age: f64,
    /// Solar rotation period (days).
    pub rotation_period: f64,
    /// Surface Z/X of the abundance mixture.
    pub surface_zx: f64,
    /// Measured solar lithium abundance A(Li).
    pub lithium: f64,

    /// ∂logL/∂X.
    pub dl_dx: f64,
    /// ∂logR/∂X.
    pub dr_dx: f64,
    /// ∂logL/∂α.
    pub dl_da: f64,
    /// ∂logR/∂α.
    pub dr_da: f64,

    /// Relative tolerance for period, Z/X and the 10 Myr angular velocity.
    pub tol_rel: f64,
    /// Relative tolerance for lithium (looser than `tol_rel`).
    pub tol_lithium: f64,
    /// Absolute tolerance on log L/Lsun.
    pub tol_log_l: f64,
    /// Absolute tolerance on log R/Rsun.
    pub tol_log_r: f64,

    /// Lower bound applied to the corrected lithium efficiency.
    pub lithium_eff_floor: f64,
}

impl Default for CalibrationTargets {
    fn default() -> Self {
        Self {
            solar_age: 4.568,
            reference_age: 0.01,
            rotation_period: 25.4,
            // Magg22 photospheric mixture.
            surface_zx: 0.0226,
            lithium: 0.96,
            dl_dx: -3.78,
            dr_dx: -0.89,
            dl_da: 0.0139,
            dr_da: -0.050,
            tol_rel: 1e-3,
            tol_lithium: 5e-3,
            tol_log_l: 5.0e-6,
            tol_log_r: 5.0e-6,
            lithium_eff_floor: 0.05,
        }
    }
}

impl CalibrationTargets {
    /// Reject targets that would make the residuals or the correction meaningless.
    pub fn validate(&self) -> Result<(), AppError> {
        let all = [
            ("solar_age", self.solar_age),
            ("reference_age", self.reference_age),
            ("rotation_period", self.rotation_period),
            ("surface_zx", self.surface_zx),
            ("lithium", self.lithium),
            ("dl_dx", self.dl_dx),
            ("dr_dx", self.dr_dx),
            ("dl_da", self.dl_da),
            ("dr_da", self.dr_da),
            ("tol_rel", self.tol_rel),
            ("tol_lithium", self.tol_lithium),
            ("tol_log_l", self.tol_log_l),
            ("tol_log_r", self.tol_log_r),
            ("lithium_eff_floor", self.lithium_eff_floor),
        ];
        for (name, v) in all {
            if !v.is_finite() {
                return Err(AppError::new(2, format!("Target `{name}` must be finite (got {v}).")));
            }
        }

        for (name, v) in [
            ("rotation_period", self.rotation_period),
            ("surface_zx", self.surface_zx),
            ("lithium", self.lithium),
            ("dl_dx", self.dl_dx),
        ] {
            if v == 0.0 {
                return Err(AppError::new(2, format!("Target `{name}` must be non-zero.")));
            }
        }

        for (name, v) in [
            ("tol_rel", self.tol_rel),
            ("tol_lithium", self.tol_lithium),
            ("tol_log_l", self.tol_log_l),
            ("tol_log_r", self.tol_log_r),
        ] {
            if v <= 0.0 {
                return Err(AppError::new(2, format!("Tolerance `{name}` must be > 0.")));
            }
        }

        if self.sensitivity_determinant().abs() < 1e-12 {
            return Err(AppError::new(
                2,
                "Sensitivity coefficients are singular (DRDA - DLDA*DRDX/DLDX ≈ 0).",
            ));
        }

        Ok(())
    }

    /// Denominator of the ΔA correction: `DRDA − DLDA·DRDX/DLDX`.
    pub fn sensitivity_determinant(&self) -> f64 {
        self.dr_da - self.dl_da * self.dr_dx / self.dl_dx
    }
}

/// 0-based column positions in a track file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub age: usize,
    pub log_l: usize,
    pub log_r: usize,
    pub lithium: usize,
    pub z_surf: usize,
    pub zx_surf: usize,
    pub i_tot: usize,
    pub i_cz: usize,
    pub w_env: usize,
    pub prot: usize,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            age: 2,
            log_l: 3,
            log_r: 4,
            lithium: 60,
            z_surf: 64,
            zx_surf: 65,
            i_tot: 68,
            i_cz: 69,
            w_env: 70,
            prot: 72,
        }
    }
}

impl ColumnMap {
    /// Smallest row width that contains every mapped column.
    pub fn min_width(&self) -> usize {
        [
            self.age,
            self.log_l,
            self.log_r,
            self.lithium,
            self.z_surf,
            self.zx_surf,
            self.i_tot,
            self.i_cz,
            self.w_env,
            self.prot,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
            + 1
    }
}

/// Parsed output of one simulator run, indexed by strictly increasing age.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CurveSet {
    /// Age (Gyr).
    pub age: Vec<f64>,
    /// log L/Lsun.
    pub log_l: Vec<f64>,
    /// log R/Rsun.
    pub log_r: Vec<f64>,
    /// Surface lithium, `log10(Li/Li[0]) + 3.31`.
    pub li_proxy: Vec<f64>,
    /// Surface metal mass fraction Z.
    pub z_surf: Vec<f64>,
    /// Surface Z/X.
    pub zx_surf: Vec<f64>,
    /// Total moment of inertia.
    pub i_tot: Vec<f64>,
    /// Convective-zone moment of inertia.
    pub i_cz: Vec<f64>,
    /// Envelope angular velocity (rad/s).
    pub w_env: Vec<f64>,
    /// Surface rotation period (days).
    pub prot: Vec<f64>,
}

impl CurveSet {
    pub fn len(&self) -> usize {
        self.age.len()
    }

    pub fn is_empty(&self) -> bool {
        self.age.is_empty()
    }
}

/// A full calibration run's configuration as understood by the loop.
///
/// Built from the campaign file, then overridden by CLI flags.
#[derive(Debug, Clone)]
pub struct CalibrationConfig {
    pub namelist_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Simulator executable; invoked as `<exe> <stem>.nml1 <stem>.nml2`.
    pub executable: PathBuf,
    /// Leading token of generated configuration names (e.g. a date).
    pub prefix: String,
    /// Correction rounds allowed after the initial run.
    pub max_iterations: usize,
    /// Simulator processes run at once.
    pub concurrency: usize,
    /// Upper bound on one batch of simulator runs.
    pub timeout: Option<Duration>,
    pub targets: CalibrationTargets,
    pub columns: ColumnMap,
    /// Optional JSON run summary.
    pub summary: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_paths_keep_dots_in_generated_names() {
        let id = ConfigId::new(
            "20230928_1_p90_PDISK_4.46171e-06",
            Path::new("/nml"),
            Path::new("/out"),
        );
        assert_eq!(id.nml1(), PathBuf::from("/nml/20230928_1_p90_PDISK_4.46171e-06.nml1"));
        assert_eq!(id.nml2(), PathBuf::from("/nml/20230928_1_p90_PDISK_4.46171e-06.nml2"));
        assert_eq!(id.track(), PathBuf::from("/out/20230928_1_p90_PDISK_4.46171e-06.track"));
    }

    #[test]
    fn successor_keeps_label_and_w10_target() {
        let params = Parameters {
            mixing_length: 1.91081247,
            hydrogen_frac: 0.710664867,
            disk_period: 4.46171e-06,
            metallicity: 0.0188,
            lithium_eff: 0.98,
            loss_eff: 6.8,
        };
        let seed = Case::seed(
            "p90",
            ConfigId::new("seed_p90", Path::new("/nml"), Path::new("/out")),
            params,
            2.38355e-05,
        );
        let next = seed.successor(
            ConfigId::new("20230928_1_p90", Path::new("/nml"), Path::new("/out")),
            Parameters { loss_eff: 7.1, ..params },
        );
        assert_eq!(next.label, "p90");
        assert_eq!(next.w10_target, 2.38355e-05);
        assert_eq!(next.params.loss_eff, 7.1);
        assert_ne!(next.config, seed.config);
    }

    #[test]
    fn default_targets_are_valid() {
        CalibrationTargets::default().validate().unwrap();
    }

    #[test]
    fn singular_sensitivities_are_rejected() {
        let targets = CalibrationTargets {
            // DRDA == DLDA*DRDX/DLDX makes ΔA undefined.
            dr_da: 0.0139 * -0.89 / -3.78,
            ..CalibrationTargets::default()
        };
        let err = targets.validate().unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn default_columns_span_the_prot_column() {
        assert_eq!(ColumnMap::default().min_width(), 73);
    }
}
