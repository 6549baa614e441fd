//! First-order parameter correction.
//!
//! Luminosity and radius are driven to solar by a 2×2 linear step in
//! (α, X) using fixed empirical sensitivities, evaluated at the final track
//! point. The remaining four knobs are rescaled by the ratio of target to
//! simulated value:
//!
//! ```text
//! ΔA = (logL_end·DRDX/DLDX − logR_end) / (DRDA − DLDA·DRDX/DLDX)
//! ΔX = −(logL_end + DLDA·ΔA) / DLDX
//! PDISK' = PDISK · w10_target / w_env(10 Myr)
//! Z'     = Z_surf[0] · ZX_target / ZX(t_sun)
//! FC'    = max(floor, FC · Li(t_sun) / Li_target)
//! FK'    = FK · P_target / Prot(t_sun)
//! ```

use serde::{Deserialize, Serialize};

use crate::calib::convergence::sample;
use crate::domain::{CalibrationTargets, CurveSet, Parameters};
use crate::error::CaseError;

/// Sensitivity denominators smaller than this (in magnitude) are treated as zero.
pub const MIN_DENOMINATOR: f64 = 1e-300;

/// A simulated quantity used as a ratio denominator must be at least this
/// fraction of its target; anything smaller has collapsed.
pub const COLLAPSE_FRACTION: f64 = 1e-8;

/// A computed correction step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    /// Change in mixing length.
    pub delta_a: f64,
    /// Change in envelope hydrogen fraction.
    pub delta_x: f64,
    pub params: Parameters,
}

/// Solve the (α, X) step from the final luminosity and radius offsets.
pub fn mixing_step(log_l_end: f64, log_r_end: f64, targets: &CalibrationTargets) -> Result<(f64, f64), CaseError> {
    let det = targets.sensitivity_determinant();
    guard("DRDA - DLDA*DRDX/DLDX", det)?;
    guard("DLDX", targets.dl_dx)?;

    let delta_a = (log_l_end * targets.dr_dx / targets.dl_dx - log_r_end) / det;
    let delta_x = -(log_l_end + targets.dl_da * delta_a) / targets.dl_dx;
    Ok((delta_a, delta_x))
}

/// Compute the next parameter vector for a case that did not converge.
pub fn next_parameters(
    curves: &CurveSet,
    current: &Parameters,
    targets: &CalibrationTargets,
    w10_target: f64,
) -> Result<Correction, CaseError> {
    let t_sol = targets.solar_age;
    let age = &curves.age;

    let (log_l_end, log_r_end) = match (curves.log_l.last(), curves.log_r.last()) {
        (Some(&l), Some(&r)) => (l, r),
        _ => {
            return Err(CaseError::DegenerateCorrection(
                "track has no final luminosity/radius".to_string(),
            ));
        }
    };
    let (delta_a, delta_x) = mixing_step(log_l_end, log_r_end, targets)?;

    let w10 = sample("w_env", targets.reference_age, age, &curves.w_env)?;
    let zx = sample("ZX_surf", t_sol, age, &curves.zx_surf)?;
    let li = sample("Li_surf", t_sol, age, &curves.li_proxy)?;
    let prot = sample("Prot", t_sol, age, &curves.prot)?;
    let z0 = curves
        .z_surf
        .first()
        .copied()
        .ok_or_else(|| CaseError::DegenerateCorrection("track has no surface Z".to_string()))?;

    guard_collapse("w_env(10 Myr)", w10, w10_target)?;
    guard_collapse("ZX_surf(t_sun)", zx, targets.surface_zx)?;
    guard("Li_target", targets.lithium)?;
    guard_collapse("Prot(t_sun)", prot, targets.rotation_period)?;

    let params = Parameters {
        mixing_length: current.mixing_length + delta_a,
        hydrogen_frac: current.hydrogen_frac + delta_x,
        disk_period: current.disk_period * (w10_target / w10),
        metallicity: z0 * (targets.surface_zx / zx),
        lithium_eff: (current.lithium_eff * (li / targets.lithium)).max(targets.lithium_eff_floor),
        loss_eff: current.loss_eff * (targets.rotation_period / prot),
    };

    if !params.is_finite() {
        return Err(CaseError::DegenerateCorrection(format!(
            "non-finite corrected parameters: {params:?}"
        )));
    }

    Ok(Correction {
        delta_a,
        delta_x,
        params,
    })
}

fn guard(what: &str, denominator: f64) -> Result<(), CaseError> {
    if denominator.is_finite() && denominator.abs() >= MIN_DENOMINATOR {
        Ok(())
    } else {
        Err(CaseError::DegenerateCorrection(format!(
            "{what} is {denominator:e}, cannot divide by it"
        )))
    }
}

/// Reject a simulated denominator that is non-finite or negligible next to `target`.
fn guard_collapse(what: &str, value: f64, target: f64) -> Result<(), CaseError> {
    let floor = (target.abs() * COLLAPSE_FRACTION).max(MIN_DENOMINATOR);
    if value.is_finite() && value.abs() >= floor {
        Ok(())
    } else {
        Err(CaseError::DegenerateCorrection(format!(
            "{what} is {value:e}, below {floor:e} (target {target:e})"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calib::convergence::tests::{W10, solar_curves};
    use approx::assert_relative_eq;

    fn start() -> Parameters {
        Parameters {
            mixing_length: 1.91081247,
            hydrogen_frac: 0.710664867,
            disk_period: 2.21952e-06,
            metallicity: 0.0188,
            lithium_eff: 0.98,
            loss_eff: 6.8,
        }
    }

    #[test]
    fn mixing_step_matches_hand_computation() {
        let targets = CalibrationTargets::default();
        let (da, dx) = mixing_step(0.01, -0.02, &targets).unwrap();

        // DRDX/DLDX   = 0.89/3.78                  = 0.2354497354
        // numerator   = 0.01*0.2354497354 + 0.02     = 0.0223544974
        // denominator = -0.050 - 0.0139*0.2354497354 = -0.0532727513
        let ratio = 0.89 / 3.78;
        let expected_da = (0.01 * ratio + 0.02) / (-0.050 - 0.0139 * ratio);
        let expected_dx = -(0.01 + 0.0139 * expected_da) / -3.78;
        assert_relative_eq!(da, expected_da, max_relative = 1e-12);
        assert_relative_eq!(dx, expected_dx, max_relative = 1e-12);
        assert_relative_eq!(da, -0.4196235, epsilon = 1e-6);
        assert_relative_eq!(dx, 0.0011024, epsilon = 1e-6);
    }

    #[test]
    fn mixing_step_uses_the_final_row() {
        let targets = CalibrationTargets::default();
        let mut curves = solar_curves();
        *curves.log_l.last_mut().unwrap() = 0.01;
        *curves.log_r.last_mut().unwrap() = -0.02;

        let c = next_parameters(&curves, &start(), &targets, W10).unwrap();
        let (da, dx) = mixing_step(0.01, -0.02, &targets).unwrap();
        assert_eq!(c.delta_a, da);
        assert_eq!(c.delta_x, dx);
        assert_relative_eq!(c.params.mixing_length, 1.91081247 + da);
        assert_relative_eq!(c.params.hydrogen_frac, 0.710664867 + dx);
    }

    #[test]
    fn converged_track_is_a_fixed_point() {
        let targets = CalibrationTargets::default();
        let c = next_parameters(&solar_curves(), &start(), &targets, W10).unwrap();
        assert_eq!(c.delta_a, 0.0);
        assert_eq!(c.delta_x, 0.0);
        assert_relative_eq!(c.params.disk_period, start().disk_period);
        assert_relative_eq!(c.params.lithium_eff, start().lithium_eff);
        assert_relative_eq!(c.params.loss_eff, start().loss_eff);
        // Z' is anchored on the track's initial surface Z, not the current parameter.
        assert_relative_eq!(c.params.metallicity, 0.0188);
    }

    #[test]
    fn ratio_corrections_scale_toward_targets() {
        let targets = CalibrationTargets::default();
        let mut curves = solar_curves();
        curves.w_env[1] = W10 / 2.0;
        curves.prot[3] = targets.rotation_period * 2.0;
        curves.zx_surf[3] = targets.surface_zx * 1.25;
        curves.z_surf[0] = 0.02;

        let c = next_parameters(&curves, &start(), &targets, W10).unwrap();
        assert_relative_eq!(c.params.disk_period, start().disk_period * 2.0);
        assert_relative_eq!(c.params.loss_eff, start().loss_eff / 2.0);
        assert_relative_eq!(c.params.metallicity, 0.02 / 1.25);
    }

    #[test]
    fn lithium_efficiency_is_floored() {
        let targets = CalibrationTargets::default();
        let mut curves = solar_curves();
        // Li far below target pushes FC toward zero (or negative).
        for li in [0.01, 0.0, -1.0] {
            curves.li_proxy[3] = li;
            let c = next_parameters(&curves, &start(), &targets, W10).unwrap();
            assert_eq!(c.params.lithium_eff, 0.05);
        }

        curves.li_proxy[3] = targets.lithium * 0.5;
        let c = next_parameters(&curves, &start(), &targets, W10).unwrap();
        assert_relative_eq!(c.params.lithium_eff, 0.49);
    }

    #[test]
    fn zero_angular_velocity_is_degenerate() {
        let targets = CalibrationTargets::default();
        let mut curves = solar_curves();
        curves.w_env = vec![0.0; curves.len()];
        let err = next_parameters(&curves, &start(), &targets, W10).unwrap_err();
        assert!(matches!(err, CaseError::DegenerateCorrection(_)));
    }

    #[test]
    fn collapsed_but_nonzero_denominators_are_degenerate() {
        let targets = CalibrationTargets::default();

        let mut curves = solar_curves();
        curves.w_env = vec![1e-200; curves.len()];
        let err = next_parameters(&curves, &start(), &targets, W10).unwrap_err();
        assert!(matches!(err, CaseError::DegenerateCorrection(ref m) if m.contains("w_env")));

        let mut curves = solar_curves();
        curves.prot[3] = targets.rotation_period * 1e-12;
        let err = next_parameters(&curves, &start(), &targets, W10).unwrap_err();
        assert!(matches!(err, CaseError::DegenerateCorrection(ref m) if m.contains("Prot")));

        let mut curves = solar_curves();
        curves.zx_surf[3] = -targets.surface_zx * 1e-9;
        assert!(next_parameters(&curves, &start(), &targets, W10).is_err());
    }

    #[test]
    fn small_but_physical_values_still_correct() {
        let targets = CalibrationTargets::default();
        let mut curves = solar_curves();
        // A hundredfold slow-down is far from collapsed.
        curves.w_env = vec![W10 / 100.0; curves.len()];
        let c = next_parameters(&curves, &start(), &targets, W10).unwrap();
        assert_relative_eq!(c.params.disk_period, start().disk_period * 100.0, max_relative = 1e-12);
    }

    #[test]
    fn zero_surface_zx_is_degenerate() {
        let targets = CalibrationTargets::default();
        let mut curves = solar_curves();
        curves.zx_surf = vec![0.0; curves.len()];
        let err = next_parameters(&curves, &start(), &targets, W10).unwrap_err();
        assert!(matches!(err, CaseError::DegenerateCorrection(_)));
    }
}
