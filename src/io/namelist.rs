//! Namelist edit sets and generated configuration names.
//!
//! The simulator reads its two namelists with a Fortran parser, so every value
//! is written with a fixed number of significant digits in C `%g` style:
//!
//! | knob                      | keys                              | digits |
//! |---------------------------|-----------------------------------|--------|
//! | hydrogen fraction X       | `RSCLX(1)`, `XENV0A(1..3)`        | 9      |
//! | mixing length α           | `CMIXLA(1..3)`                    | 9      |
//! | metallicity Z             | `RSCLZ(1)`, `ZENV0A(1..3)`        | 5      |
//! | disk-locking period       | `PDISK`                           | 6      |
//! | lithium efficiency        | `FC`                              | 3      |
//! | angular-momentum loss     | `FK`                              | 5      |
//!
//! The first namelist also names every output file; those are repointed at the
//! new case's output stem so runs never overwrite each other.

use std::path::Path;

use crate::domain::Parameters;
use crate::io::patch::Edit;

pub const DIGITS_COMPOSITION: usize = 9;
pub const DIGITS_DISK_PERIOD: usize = 6;
pub const DIGITS_METALLICITY: usize = 5;
pub const DIGITS_LITHIUM_EFF: usize = 3;
pub const DIGITS_LOSS_EFF: usize = 5;

/// Output-file keys of the first namelist and the extension each one gets.
const OUTPUT_FILES: [(&str, &str); 12] = [
    ("FLAST", "last"),
    ("FMODPT", "full"),
    ("FSTOR", "store"),
    ("FTRACK", "track"),
    ("FSHORT", "short"),
    ("FPMOD", "pmod"),
    ("FPENV", "penv"),
    ("FPATM", "atm"),
    ("FSNU", "snu"),
    ("FSCOMP", "excomp"),
    ("FDEBUG", "debug"),
    ("FMILNE", "milne"),
];

/// Format `value` like C's `%.{digits}g`.
///
/// Scientific notation is used when the decimal exponent is below -4 or at
/// least `digits`; trailing zeros (and a bare trailing point) are removed.
pub fn fmt_g(value: f64, digits: usize) -> String {
    if !value.is_finite() {
        return format!("{value}");
    }
    if value == 0.0 {
        return "0".to_string();
    }

    let digits = digits.max(1);
    // Let the formatter do the rounding; read the exponent back from it.
    let sci = format!("{:.*e}", digits - 1, value);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };

    if exp < -4 || exp >= digits as i32 {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_fraction(mantissa), exp.abs())
    } else {
        let decimals = (digits as i32 - 1 - exp).max(0) as usize;
        trim_fraction(&format!("{value:.decimals$}")).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Name for a generated configuration.
///
/// Encodes the iteration it will be run in, the seed label and the rotation /
/// composition knobs, so two cases can never share a name within an iteration.
pub fn case_name(prefix: &str, iteration: usize, label: &str, params: &Parameters) -> String {
    format!(
        "{prefix}_{iteration}_{label}_PDISK_{}_ZINIT_{}_FC_{}_FK_{}",
        fmt_g(params.disk_period, DIGITS_DISK_PERIOD),
        fmt_g(params.metallicity, DIGITS_METALLICITY),
        fmt_g(params.lithium_eff, DIGITS_LITHIUM_EFF),
        fmt_g(params.loss_eff, DIGITS_LOSS_EFF),
    )
}

/// Edits for the first namelist: composition, mixing length and output files.
pub fn nml1_edits(params: &Parameters, output_stem: &Path) -> Vec<Edit> {
    let x = fmt_g(params.hydrogen_frac, DIGITS_COMPOSITION);
    let a = fmt_g(params.mixing_length, DIGITS_COMPOSITION);
    let z = fmt_g(params.metallicity, DIGITS_METALLICITY);

    let mut edits = vec![assign("RSCLX(1)", &x)];
    edits.extend((1..=3).map(|i| assign(&format!("XENV0A({i})"), &x)));
    edits.extend((1..=3).map(|i| assign(&format!("CMIXLA({i})"), &a)));
    edits.push(assign("RSCLZ(1)", &z));
    edits.extend((1..=3).map(|i| assign(&format!("ZENV0A({i})"), &z)));

    let stem = output_stem.display();
    edits.extend(
        OUTPUT_FILES
            .iter()
            .map(|(key, ext)| assign(key, &format!("'{stem}.{ext}'"))),
    );
    edits
}

/// Edits for the second namelist: rotation and lithium physics.
pub fn nml2_edits(params: &Parameters) -> Vec<Edit> {
    vec![
        assign("PDISK", &fmt_g(params.disk_period, DIGITS_DISK_PERIOD)),
        assign("FC", &fmt_g(params.lithium_eff, DIGITS_LITHIUM_EFF)),
        assign("FK", &fmt_g(params.loss_eff, DIGITS_LOSS_EFF)),
    ]
}

fn assign(key: &str, value: &str) -> Edit {
    Edit::new(format!("{key} ="), format!("{key} = {value}"))
}

/// Read back the value of `KEY = value` from namelist text.
///
/// Only used to cross-check generated namelists; it is not a namelist parser.
pub fn lookup(text: &str, key: &str) -> Option<String> {
    let needle = format!("{key} =");
    text.lines()
        .find_map(|line| line.split_once(needle.as_str()).map(|(_, v)| v.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Parameters {
        Parameters {
            mixing_length: 1.91081247,
            hydrogen_frac: 7.10664867e-01,
            disk_period: 4.46171e-06,
            metallicity: 0.018781,
            lithium_eff: 0.98,
            loss_eff: 6.80,
        }
    }

    #[test]
    fn fmt_g_matches_c_style() {
        assert_eq!(fmt_g(4.46171e-06, 6), "4.46171e-06");
        assert_eq!(fmt_g(0.98, 3), "0.98");
        assert_eq!(fmt_g(6.80, 5), "6.8");
        assert_eq!(fmt_g(1.91081247, 9), "1.91081247");
        assert_eq!(fmt_g(0.710664867, 9), "0.710664867");
        assert_eq!(fmt_g(100.0, 3), "100");
        assert_eq!(fmt_g(1000.0, 3), "1e+03");
        assert_eq!(fmt_g(0.0001, 3), "0.0001");
        assert_eq!(fmt_g(-2.5e-7, 3), "-2.5e-07");
        assert_eq!(fmt_g(0.0, 5), "0");
        // Rounding can bump the exponent.
        assert_eq!(fmt_g(9.9996, 4), "10");
        assert_eq!(fmt_g(0.123456789, 3), "0.123");
    }

    #[test]
    fn case_name_encodes_iteration_label_and_knobs() {
        let name = case_name("20230928", 2, "p90", &params());
        assert_eq!(name, "20230928_2_p90_PDISK_4.46171e-06_ZINIT_0.018781_FC_0.98_FK_6.8");
    }

    #[test]
    fn nml1_edits_cover_composition_and_outputs() {
        let edits = nml1_edits(&params(), Path::new("/out/run"));
        assert_eq!(edits.len(), 11 + OUTPUT_FILES.len());

        let keys: Vec<&str> = edits.iter().map(|e| e.key.as_str()).collect();
        assert!(keys.contains(&"XENV0A(3) ="));
        assert!(keys.contains(&"CMIXLA(1) ="));
        assert!(keys.contains(&"ZENV0A(2) ="));

        let track = edits.iter().find(|e| e.key == "FTRACK =").unwrap();
        assert_eq!(track.line, "FTRACK = '/out/run.track'");
        let x = edits.iter().find(|e| e.key == "RSCLX(1) =").unwrap();
        assert_eq!(x.line, "RSCLX(1) = 0.710664867");
    }

    #[test]
    fn nml2_edits_use_designated_precision() {
        let p = Parameters {
            disk_period: 2.219523456e-06,
            lithium_eff: 0.98765,
            loss_eff: 6.8123456,
            ..params()
        };
        let lines: Vec<String> = nml2_edits(&p).into_iter().map(|e| e.line).collect();
        assert_eq!(lines, vec!["PDISK = 2.21952e-06", "FC = 0.988", "FK = 6.8123"]);
    }

    #[test]
    fn lookup_reads_assignments() {
        let text = " PDISK = 1.5e-06\n FC = 0.98\n";
        assert_eq!(lookup(text, "FC").as_deref(), Some("0.98"));
        assert_eq!(lookup(text, "FK"), None);
    }
}
