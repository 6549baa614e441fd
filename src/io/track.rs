//! Track-file ingest.
//!
//! The simulator writes a whitespace-delimited numeric table, one row per
//! time step, with header and comment lines mixed in. This module turns it
//! into a `CurveSet`:
//!
//! - **Lenient rows**: anything that is not a fully numeric row is skipped
//!   and counted, never fatal on its own
//! - **Strict result**: fewer than two usable rows, or a non-positive initial
//!   lithium abundance, fails the case
//! - **Monotonic age**: rows with a non-finite age, or one that does not
//!   advance, are dropped so interpolation always sees a strictly increasing table

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::domain::{ColumnMap, CurveSet};
use crate::error::CaseError;

/// Offset added to `log10(Li/Li0)` to express surface lithium as A(Li).
pub const LITHIUM_ZERO_POINT: f64 = 3.31;

/// Minimum rows needed to interpolate.
pub const MIN_ROWS: usize = 2;

/// A raw numeric table: every row parsed completely as floats.
#[derive(Debug, Clone, Default)]
pub struct TrackTable {
    pub rows: Vec<Vec<f64>>,
    /// Lines that were not blank but failed to parse as numbers.
    pub skipped: usize,
}

/// Parse every fully numeric line of a track file.
///
/// Fortran double exponents (`1.0D+00`) are accepted.
pub fn parse_track(path: &Path) -> Result<TrackTable, CaseError> {
    let text = fs::read_to_string(path).map_err(|e| CaseError::MissingResult {
        path: path.to_path_buf(),
        message: format!("cannot read track: {e}"),
    })?;
    Ok(parse_track_str(&text))
}

fn parse_track_str(text: &str) -> TrackTable {
    let mut table = TrackTable::default();

    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('#') {
            table.skipped += 1;
            continue;
        }

        match parse_row(line) {
            Some(row) => table.rows.push(row),
            None => {
                debug!(line = idx + 1, "skipping non-numeric track row");
                table.skipped += 1;
            }
        }
    }

    table
}

fn parse_row(line: &str) -> Option<Vec<f64>> {
    line.split_whitespace().map(parse_number).collect()
}

fn parse_number(token: &str) -> Option<f64> {
    if let Ok(v) = token.parse::<f64>() {
        return Some(v);
    }
    // Fortran writes doubles as 1.234D-05.
    if token.contains(['D', 'd']) {
        return token.replace(['D', 'd'], "E").parse::<f64>().ok();
    }
    None
}

/// Load the calibrated quantities from a track file.
pub fn read_curves(path: &Path, columns: &ColumnMap) -> Result<CurveSet, CaseError> {
    if !path.exists() {
        return Err(CaseError::MissingResult {
            path: path.to_path_buf(),
            message: "file does not exist".to_string(),
        });
    }

    let table = parse_track(path)?;
    curves_from_table(path, &table, columns)
}

fn curves_from_table(path: &Path, table: &TrackTable, columns: &ColumnMap) -> Result<CurveSet, CaseError> {
    let width = columns.min_width();
    let mut curves = CurveSet::default();
    let mut lithium = Vec::new();
    let mut narrow = 0usize;
    let mut out_of_order = 0usize;

    for row in &table.rows {
        if row.len() < width {
            narrow += 1;
            continue;
        }

        let age = row[columns.age];
        if !age.is_finite() {
            out_of_order += 1;
            continue;
        }
        if let Some(&prev) = curves.age.last() {
            if age <= prev {
                out_of_order += 1;
                continue;
            }
        }

        curves.age.push(age);
        curves.log_l.push(row[columns.log_l]);
        curves.log_r.push(row[columns.log_r]);
        lithium.push(row[columns.lithium]);
        curves.z_surf.push(row[columns.z_surf]);
        curves.zx_surf.push(row[columns.zx_surf]);
        curves.i_tot.push(row[columns.i_tot]);
        curves.i_cz.push(row[columns.i_cz]);
        curves.w_env.push(row[columns.w_env]);
        curves.prot.push(row[columns.prot]);
    }

    if narrow > 0 || out_of_order > 0 || table.skipped > 0 {
        debug!(
            path = %path.display(),
            skipped = table.skipped,
            narrow,
            out_of_order,
            "dropped track rows"
        );
    }

    if curves.len() < MIN_ROWS {
        return Err(CaseError::MissingResult {
            path: path.to_path_buf(),
            message: format!(
                "only {} usable row(s); at least {MIN_ROWS} are needed",
                curves.len()
            ),
        });
    }

    curves.li_proxy = lithium_proxy(path, &lithium)?;
    Ok(curves)
}

/// Express surface lithium relative to its initial value, on the A(Li) scale.
fn lithium_proxy(path: &Path, lithium: &[f64]) -> Result<Vec<f64>, CaseError> {
    let li0 = lithium.first().copied().unwrap_or(0.0);
    if !(li0 > 0.0) {
        return Err(CaseError::DegenerateInput {
            path: path.to_path_buf(),
            message: format!("initial surface lithium must be > 0 (got {li0})"),
        });
    }
    Ok(lithium
        .iter()
        .map(|li| (li / li0).log10() + LITHIUM_ZERO_POINT)
        .collect())
}
