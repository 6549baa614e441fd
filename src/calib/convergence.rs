//! Six-way tolerance check of one simulated track against the solar targets.
//!
//! Five quantities are read at the solar age, one (the envelope angular
//! velocity) at 10 Myr. Period, Z/X and angular velocity are compared as
//! fractional differences, lithium as a fractional difference with its own
//! looser tolerance, and log L / log R as absolute offsets from solar (zero).

use serde::{Deserialize, Serialize};

use crate::domain::{CalibrationTargets, CurveSet};
use crate::error::CaseError;
use crate::math::interp;

/// One of the six convergence tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    RotationPeriod,
    SurfaceZx,
    Lithium,
    Luminosity,
    Radius,
    EarlyRotation,
}

impl Check {
    pub const ALL: [Check; 6] = [
        Check::RotationPeriod,
        Check::SurfaceZx,
        Check::Lithium,
        Check::Luminosity,
        Check::Radius,
        Check::EarlyRotation,
    ];

    /// Short label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            Check::RotationPeriod => "Prot",
            Check::SurfaceZx => "ZX_surf",
            Check::Lithium => "Li_surf",
            Check::Luminosity => "logL",
            Check::Radius => "logR",
            Check::EarlyRotation => "w10",
        }
    }
}

/// Residual of each test, as compared against its tolerance.
///
/// Relative tests hold `|value - target| / target`; luminosity and radius hold
/// `|value|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Residuals {
    pub rotation_period: f64,
    pub surface_zx: f64,
    pub lithium: f64,
    pub log_l: f64,
    pub log_r: f64,
    pub w10: f64,
}

impl Residuals {
    pub fn get(&self, check: Check) -> f64 {
        match check {
            Check::RotationPeriod => self.rotation_period,
            Check::SurfaceZx => self.surface_zx,
            Check::Lithium => self.lithium,
            Check::Luminosity => self.log_l,
            Check::Radius => self.log_r,
            Check::EarlyRotation => self.w10,
        }
    }
}

/// Result of evaluating a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Convergence {
    pub residuals: Residuals,
    /// Tests that did not pass, in `Check::ALL` order.
    pub failed: Vec<Check>,
}

impl Convergence {
    pub fn is_converged(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Tolerance each test is held to.
pub fn tolerance(check: Check, targets: &CalibrationTargets) -> f64 {
    match check {
        Check::RotationPeriod | Check::SurfaceZx | Check::EarlyRotation => targets.tol_rel,
        Check::Lithium => targets.tol_lithium,
        Check::Luminosity => targets.tol_log_l,
        Check::Radius => targets.tol_log_r,
    }
}

/// Interpolate a named quantity, turning a failed lookup into a case error.
pub(crate) fn sample(quantity: &'static str, age: f64, ages: &[f64], values: &[f64]) -> Result<f64, CaseError> {
    interp(age, ages, values).ok_or(CaseError::Interpolation { quantity, age })
}

/// Compute all six residuals for a track.
pub fn evaluate(curves: &CurveSet, targets: &CalibrationTargets, w10_target: f64) -> Result<Convergence, CaseError> {
    let t_sol = targets.solar_age;
    let t_ref = targets.reference_age;
    let age = &curves.age;

    let prot = sample("Prot", t_sol, age, &curves.prot)?;
    let zx = sample("ZX_surf", t_sol, age, &curves.zx_surf)?;
    let li = sample("Li_surf", t_sol, age, &curves.li_proxy)?;
    let log_l = sample("logL", t_sol, age, &curves.log_l)?;
    let log_r = sample("logR", t_sol, age, &curves.log_r)?;
    let w10 = sample("w_env", t_ref, age, &curves.w_env)?;

    let residuals = Residuals {
        rotation_period: relative(prot, targets.rotation_period),
        surface_zx: relative(zx, targets.surface_zx),
        lithium: relative(li, targets.lithium),
        log_l: log_l.abs(),
        log_r: log_r.abs(),
        w10: relative(w10, w10_target),
    };

    // `!(r < tol)` so a NaN residual counts as a failure.
    let failed = Check::ALL
        .into_iter()
        .filter(|&c| !(residuals.get(c) < tolerance(c, targets)))
        .collect();

    Ok(Convergence { residuals, failed })
}

/// `true` iff all six tests pass.
pub fn is_converged(curves: &CurveSet, targets: &CalibrationTargets, w10_target: f64) -> Result<bool, CaseError> {
    evaluate(curves, targets, w10_target).map(|c| c.is_converged())
}

fn relative(value: f64, target: f64) -> f64 {
    ((value - target) / target).abs()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const W10: f64 = 2.38355e-05;

    /// A track that satisfies every default target exactly.
    pub(crate) fn solar_curves() -> CurveSet {
        let t = CalibrationTargets::default();
        let age = vec![0.001, 0.01, 1.0, t.solar_age, 4.7];
        let n = age.len();
        CurveSet {
            age,
            log_l: vec![0.0; n],
            log_r: vec![0.0; n],
            li_proxy: vec![3.31, 3.31, 2.0, t.lithium, 0.9],
            z_surf: vec![0.0188; n],
            zx_surf: vec![t.surface_zx; n],
            i_tot: vec![1.0; n],
            i_cz: vec![0.5; n],
            w_env: vec![W10; n],
            prot: vec![1.0, 2.0, 10.0, t.rotation_period, 26.0],
        }
    }

    /// Push exactly one test out of tolerance.
    fn break_one(curves: &mut CurveSet, check: Check) {
        let idx = 3; // solar-age row
        match check {
            Check::RotationPeriod => curves.prot[idx] *= 1.01,
            Check::SurfaceZx => curves.zx_surf[idx] *= 0.99,
            Check::Lithium => curves.li_proxy[idx] *= 1.01,
            Check::Luminosity => curves.log_l[idx] = 1e-4,
            Check::Radius => curves.log_r[idx] = -1e-4,
            Check::EarlyRotation => curves.w_env[1] *= 1.05,
        }
    }

    #[test]
    fn solar_track_converges() {
        let targets = CalibrationTargets::default();
        let result = evaluate(&solar_curves(), &targets, W10).unwrap();
        assert!(result.is_converged(), "failed: {:?}", result.failed);
        assert!(is_converged(&solar_curves(), &targets, W10).unwrap());
    }

    #[test]
    fn each_check_fails_independently() {
        let targets = CalibrationTargets::default();
        for check in Check::ALL {
            let mut curves = solar_curves();
            break_one(&mut curves, check);
            let result = evaluate(&curves, &targets, W10).unwrap();
            assert_eq!(result.failed, vec![check], "breaking {check:?}");
            assert!(!result.is_converged());
        }
    }

    #[test]
    fn lithium_uses_its_own_looser_tolerance() {
        let targets = CalibrationTargets::default();
        let mut curves = solar_curves();
        // 3e-3 off: outside tol_rel but inside tol_lithium.
        curves.li_proxy[3] = targets.lithium * 1.003;
        let result = evaluate(&curves, &targets, W10).unwrap();
        assert!(result.is_converged());
        assert!(result.residuals.lithium > targets.tol_rel);
    }

    #[test]
    fn solar_age_is_interpolated_not_the_last_row() {
        let targets = CalibrationTargets::default();
        let mut curves = solar_curves();
        // Changing only rows past the solar age must not affect the residuals.
        *curves.prot.last_mut().unwrap() = 100.0;
        *curves.log_l.last_mut().unwrap() = 0.5;
        assert!(evaluate(&curves, &targets, W10).unwrap().is_converged());
    }

    #[test]
    fn empty_curves_are_an_interpolation_error() {
        let targets = CalibrationTargets::default();
        let err = evaluate(&CurveSet::default(), &targets, W10).unwrap_err();
        assert!(matches!(err, CaseError::Interpolation { .. }));
    }

    #[test]
    fn nan_in_a_curve_is_an_interpolation_error() {
        let targets = CalibrationTargets::default();
        let mut curves = solar_curves();
        curves.zx_surf[3] = f64::NAN;
        let err = evaluate(&curves, &targets, W10).unwrap_err();
        assert_eq!(
            err,
            CaseError::Interpolation {
                quantity: "ZX_surf",
                age: targets.solar_age
            }
        );
    }
}
