//! Copy-then-edit rewriting of simulator namelists.
//!
//! The source namelist is only ever read. Its contents are duplicated into the
//! target path with selected lines replaced, so a failed patch never leaves
//! the source half-written.

use std::fs;
use std::path::Path;

use crate::error::CaseError;

/// Replace every line containing `key` with `line`.
///
/// `line` is the complete replacement text without its line terminator; the
/// terminator of the replaced line is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub key: String,
    pub line: String,
}

impl Edit {
    pub fn new(key: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            line: line.into(),
        }
    }
}

/// What a patch actually changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    /// Number of lines rewritten (a line hit by several edits counts once).
    pub lines_replaced: usize,
    /// Keys that matched no line. Supplying only keys that exist is the
    /// caller's job; these are surfaced so a typo does not go unnoticed.
    pub unmatched: Vec<String>,
}

/// Duplicate `source` to `target`, applying `edits` to the copy.
///
/// Edits are applied in order to each line, so a later key is matched against
/// the output of an earlier edit. The parent directory of `target` is created
/// if needed.
pub fn patch(source: &Path, target: &Path, edits: &[Edit]) -> Result<PatchReport, CaseError> {
    let text = fs::read_to_string(source).map_err(|e| CaseError::Configuration {
        path: source.to_path_buf(),
        message: format!("cannot read source namelist: {e}"),
    })?;

    let (patched, report) = apply_edits(&text, edits);

    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| CaseError::Configuration {
            path: target.to_path_buf(),
            message: format!("cannot create namelist directory: {e}"),
        })?;
    }

    fs::write(target, patched).map_err(|e| CaseError::Configuration {
        path: target.to_path_buf(),
        message: format!("cannot write patched namelist: {e}"),
    })?;

    Ok(report)
}

fn apply_edits(text: &str, edits: &[Edit]) -> (String, PatchReport) {
    let mut out = String::with_capacity(text.len());
    let mut hits = vec![0usize; edits.len()];
    let mut lines_replaced = 0usize;

    for raw in text.split_inclusive('\n') {
        let (body, ending) = split_ending(raw);

        let mut current: Option<&str> = None;
        for (i, edit) in edits.iter().enumerate() {
            if current.unwrap_or(body).contains(edit.key.as_str()) {
                current = Some(edit.line.as_str());
                hits[i] += 1;
            }
        }

        match current {
            Some(line) => {
                lines_replaced += 1;
                out.push_str(line);
            }
            None => out.push_str(body),
        }
        out.push_str(ending);
    }

    let unmatched = edits
        .iter()
        .zip(hits)
        .filter(|(_, n)| *n == 0)
        .map(|(e, _)| e.key.clone())
        .collect();

    (
        out,
        PatchReport {
            lines_replaced,
            unmatched,
        },
    )
}

fn split_ending(raw: &str) -> (&str, &str) {
    if let Some(body) = raw.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = raw.strip_suffix('\n') {
        (body, "\n")
    } else {
        (raw, "")
    }
}
