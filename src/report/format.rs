//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the calibration loop stays free of presentation details
//! - output changes are localized

use std::path::Path;

use crate::calib::{Check, Convergence, Correction, Residuals, tolerance};
use crate::calib::driver::{CalibrationOutcome, CaseReport};
use crate::domain::{CalibrationTargets, Parameters};
use crate::io::namelist::{
    DIGITS_COMPOSITION, DIGITS_DISK_PERIOD, DIGITS_LITHIUM_EFF, DIGITS_LOSS_EFF, DIGITS_METALLICITY, fmt_g,
};

const RULE: &str = "--------------------";

/// Per-test residuals of a case that did not converge.
pub fn format_case_diagnostics(track: &Path, check: &Convergence) -> String {
    let r = &check.residuals;
    let mut out = String::new();
    out.push_str(&format!("filename: {}\n", track.display()));
    out.push_str(RULE);
    out.push('\n');
    out.push_str(&format!("diff logL {}\n", fmt_g(r.log_l, 3)));
    out.push_str(&format!("diff logR {}\n", fmt_g(r.log_r, 3)));
    out.push_str(&format!("fractional diff Prot {}\n", fmt_g(r.rotation_period, 3)));
    out.push_str(&format!("fractional diff ZX_surf {}\n", fmt_g(r.surface_zx, 3)));
    out.push_str(&format!("fractional diff Li_surf {}\n", fmt_g(r.lithium, 3)));
    out.push_str(&format!("fractional diff w10 {}\n", fmt_g(r.w10, 3)));
    out.push_str(RULE);
    out
}

/// The new parameter values, at the precision they are written to the namelists.
pub fn format_correction(c: &Correction) -> String {
    let p = &c.params;
    let mut out = String::new();
    out.push_str(&format!(
        "new CMIXLA {} DA {}\n",
        fmt_g(p.mixing_length, DIGITS_COMPOSITION),
        fmt_g(c.delta_a, DIGITS_COMPOSITION)
    ));
    out.push_str(&format!(
        "new XENV0A {} DX {}\n",
        fmt_g(p.hydrogen_frac, DIGITS_COMPOSITION),
        fmt_g(c.delta_x, DIGITS_COMPOSITION)
    ));
    out.push_str(&format!("new PDISK {}\n", fmt_g(p.disk_period, DIGITS_DISK_PERIOD)));
    out.push_str(&format!("new ZENV0A {}\n", fmt_g(p.metallicity, DIGITS_METALLICITY)));
    out.push_str(&format!("new FC {}\n", fmt_g(p.lithium_eff, DIGITS_LITHIUM_EFF)));
    out.push_str(&format!("new FK {}", fmt_g(p.loss_eff, DIGITS_LOSS_EFF)));
    out
}

/// Pass/fail table for one track (used by `solcal check`).
pub fn format_check(track: &Path, check: &Convergence, targets: &CalibrationTargets) -> String {
    let mut out = String::new();
    out.push_str(&format!("Track: {}\n", track.display()));
    out.push_str(&format!("{:<8} {:>12} {:>12} {:<4}\n", "test", "residual", "tolerance", "ok"));
    out.push_str(&format!("{:-<8} {:-<12} {:-<12} {:-<4}\n", "", "", "", ""));
    for c in Check::ALL {
        let ok = if check.failed.contains(&c) { "FAIL" } else { "ok" };
        out.push_str(&format!(
            "{:<8} {:>12} {:>12} {ok}\n",
            c.display_name(),
            fmt_g(check.residuals.get(c), 3),
            fmt_g(tolerance(c, targets), 3),
        ));
    }
    out.push_str(if check.is_converged() { "Converged.\n" } else { "Not converged.\n" });
    out
}

/// End-of-run summary: one line per case, then the final status.
pub fn format_outcome(outcome: &CalibrationOutcome) -> String {
    let mut out = String::new();
    out.push_str("=== solcal - solar rotation calibration ===\n");
    out.push_str(&format!(
        "Iterations run: {} (max {})\n",
        outcome.iterations_run, outcome.max_iterations
    ));

    section(&mut out, "Converged", &outcome.converged, |r| {
        format!("{:<10} iter {:>2}  {}", r.label, r.iteration, r.config)
    });
    section(&mut out, "Abandoned", &outcome.abandoned, |r| {
        let mut line = format!(
            "{:<10} iter {:>2}  {}",
            r.label,
            r.iteration,
            r.error.as_deref().unwrap_or("unknown error")
        );
        line.push_str(&format!("\n{:<10} params: {}", "", fmt_params(&r.params)));
        if let Some(res) = &r.residuals {
            line.push_str(&format!("\n{:<10} residuals: {}", "", fmt_residuals(res)));
        }
        line
    });
    section(&mut out, "Not converged", &outcome.not_converged, |r| {
        let failed: Vec<&str> = r.failed.iter().map(|c| c.display_name()).collect();
        let mut line = format!("{:<10} failing: {}", r.label, failed.join(", "));
        if let Some(s) = &r.suggested {
            line.push_str(&format!("\n{:<10} suggested: {}", "", fmt_params(s)));
        }
        line
    });

    out.push('\n');
    if outcome.finished() {
        out.push_str("Done!\n");
    } else {
        out.push_str(&format!(
            "Failed to converge after {} iterations\n",
            outcome.max_iterations
        ));
    }
    out
}

fn section(out: &mut String, title: &str, rows: &[CaseReport], line: impl Fn(&CaseReport) -> String) {
    if rows.is_empty() {
        return;
    }
    out.push_str(&format!("\n{title} ({}):\n", rows.len()));
    for r in rows {
        out.push_str("  ");
        out.push_str(&line(r));
        out.push('\n');
    }
}

/// All six residuals on one line, 3 significant digits.
pub fn fmt_residuals(r: &Residuals) -> String {
    Check::ALL
        .iter()
        .map(|&c| format!("{}={}", c.display_name(), fmt_g(r.get(c), 3)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parameters as they would appear in the namelists.
pub fn fmt_params(p: &Parameters) -> String {
    format!(
        "CMIXLA={} XENV0A={} PDISK={} ZENV0A={} FC={} FK={}",
        fmt_g(p.mixing_length, DIGITS_COMPOSITION),
        fmt_g(p.hydrogen_frac, DIGITS_COMPOSITION),
        fmt_g(p.disk_period, DIGITS_DISK_PERIOD),
        fmt_g(p.metallicity, DIGITS_METALLICITY),
        fmt_g(p.lithium_eff, DIGITS_LITHIUM_EFF),
        fmt_g(p.loss_eff, DIGITS_LOSS_EFF),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CaseStatus;

    fn params() -> Parameters {
        Parameters {
            mixing_length: 1.91081247,
            hydrogen_frac: 0.710664867,
            disk_period: 4.46171e-06,
            metallicity: 0.0188,
            lithium_eff: 0.98,
            loss_eff: 6.8,
        }
    }

    fn residuals() -> Residuals {
        Residuals {
            rotation_period: 0.0123456,
            surface_zx: 1e-5,
            lithium: 0.0,
            log_l: 2.5e-7,
            log_r: 1e-6,
            w10: 0.5,
        }
    }

    #[test]
    fn diagnostics_use_three_significant_digits() {
        let check = Convergence {
            residuals: residuals(),
            failed: vec![Check::RotationPeriod, Check::EarlyRotation],
        };
        let text = format_case_diagnostics(Path::new("/out/a.track"), &check);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "filename: /out/a.track");
        assert_eq!(lines[2], "diff logL 2.5e-07");
        assert_eq!(lines[4], "fractional diff Prot 0.0123");
        assert_eq!(lines[6], "fractional diff Li_surf 0");
        assert_eq!(lines[7], "fractional diff w10 0.5");
    }

    #[test]
    fn correction_lines_match_namelist_precision() {
        let c = Correction {
            delta_a: -0.0123456789012,
            delta_x: 0.001,
            params: Parameters {
                loss_eff: 6.8123456,
                ..params()
            },
        };
        let text = format_correction(&c);
        assert!(text.starts_with("new CMIXLA 1.91081247 DA -0.0123456789\n"));
        assert!(text.ends_with("new FK 6.8123"));
    }

    #[test]
    fn check_table_marks_failures() {
        let check = Convergence {
            residuals: residuals(),
            failed: vec![Check::EarlyRotation],
        };
        let text = format_check(Path::new("t.track"), &check, &CalibrationTargets::default());
        assert!(text.lines().any(|l| l.starts_with("w10") && l.ends_with("FAIL")));
        assert!(text.lines().any(|l| l.starts_with("Prot") && l.ends_with("ok")));
        assert!(text.ends_with("Not converged.\n"));
    }

    #[test]
    fn outcome_ends_with_status_line() {
        let report = CaseReport {
            label: "p90".to_string(),
            config: "seed_p90".to_string(),
            iteration: 3,
            status: CaseStatus::Pending,
            params: params(),
            residuals: Some(residuals()),
            failed: vec![Check::RotationPeriod],
            suggested: Some(params()),
            error: None,
        };
        let mut outcome = CalibrationOutcome {
            max_iterations: 3,
            iterations_run: 4,
            not_converged: vec![report.clone()],
            ..CalibrationOutcome::default()
        };
        let text = format_outcome(&outcome);
        assert!(text.contains("p90        failing: Prot"));
        assert!(text.contains("suggested: CMIXLA=1.91081247"));
        assert!(text.ends_with("Failed to converge after 3 iterations\n"));

        outcome.not_converged.clear();
        outcome.converged.push(CaseReport {
            status: CaseStatus::Converged,
            ..report.clone()
        });
        assert!(format_outcome(&outcome).ends_with("Done!\n"));

        // Abandoned cases carry what is needed to re-seed them by hand.
        outcome.abandoned.push(CaseReport {
            label: "p10".to_string(),
            status: CaseStatus::Abandoned,
            suggested: None,
            error: Some("degenerate correction: w_env(10 Myr) is 0e0".to_string()),
            ..report
        });
        let text = format_outcome(&outcome);
        let abandoned: Vec<&str> = text
            .lines()
            .skip_while(|l| !l.starts_with("Abandoned"))
            .take(4)
            .collect();
        assert_eq!(abandoned[0], "Abandoned (1):");
        assert!(abandoned[1].contains("p10") && abandoned[1].contains("degenerate correction"));
        assert!(abandoned[2].trim_start().starts_with("params: CMIXLA=1.91081247"));
        assert!(abandoned[2].contains("PDISK=4.46171e-06"));
        assert_eq!(
            abandoned[3].trim_start(),
            "residuals: Prot=0.0123 ZX_surf=1e-05 Li_surf=0 logL=2.5e-07 logR=1e-06 w10=0.5"
        );
    }
}
