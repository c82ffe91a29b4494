//! Eligibility reference table reader.

use std::path::Path;

use tracing::{debug, info, instrument};

use tractcheck_shared::{ReferenceColumns, Result};

use crate::{column_index, csv_error, open_reader};

/// Read `(tract key, flag)` pairs from a reference CSV.
///
/// Rows with an empty tract key are dropped. Keys are normalized with
/// [`normalize_tract_key`]; flags are passed through untouched.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_reference(
    path: &Path,
    columns: &ReferenceColumns,
    tract_len: usize,
) -> Result<Vec<(String, String)>> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers().map_err(|e| csv_error(path, e))?.clone();

    let tract = column_index(path, &headers, &columns.tract_column)?;
    let flag = column_index(path, &headers, &columns.flag_column)?;

    let mut pairs = Vec::new();
    let mut dropped = 0usize;

    for result in reader.records() {
        let fields = result.map_err(|e| csv_error(path, e))?;
        let key = normalize_tract_key(fields.get(tract).unwrap_or(""), tract_len);
        if key.is_empty() {
            dropped += 1;
            continue;
        }
        pairs.push((key, fields.get(flag).unwrap_or("").to_string()));
    }

    if dropped > 0 {
        debug!(dropped, "reference rows without a tract key");
    }
    info!(rows = pairs.len(), "reference table loaded");

    Ok(pairs)
}

/// Canonical text form of a tract key.
///
/// Trims whitespace, drops a `.0` left by spreadsheet float exports, and
/// restores leading zeros on all-digit keys shorter than `tract_len` (state
/// FIPS codes below 10 lose their zero when a column is read as a number).
pub fn normalize_tract_key(raw: &str, tract_len: usize) -> String {
    let mut key = raw.trim();

    if let Some(stripped) = key.strip_suffix(".0") {
        if !stripped.is_empty() && stripped.bytes().all(|b| b.is_ascii_digit()) {
            key = stripped;
        }
    }

    if !key.is_empty() && key.len() < tract_len && key.bytes().all(|b| b.is_ascii_digit()) {
        format!("{key:0>tract_len$}")
    } else {
        key.to_string()
    }
}
