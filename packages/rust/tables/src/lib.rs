//! CSV input and output around the enrichment pipeline.
//!
//! - [`read_dataset`]: stations table, filtered by open date, as [`Record`]s
//! - [`read_reference`]: `(tract, flag)` pairs from an eligibility table
//! - [`write_annotated`]: filtered rows plus the eligibility columns
//!
//! [`Record`]: tractcheck_shared::Record

mod dataset;
mod output;
mod reference;

use std::path::Path;

use tractcheck_shared::{Result, TractcheckError};

pub use dataset::{Dataset, DatasetRow, read_dataset};
pub use output::{SKIP_REASON_COLUMN, verdict_cell, write_annotated};
pub use reference::{normalize_tract_key, read_reference};

/// Open a CSV file with headers, tolerating ragged rows.
fn open_reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| csv_error(path, e))
}

/// Position of `name` in the header row.
fn column_index(path: &Path, headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| TractcheckError::table(path, format!("missing column '{name}'")))
}

fn csv_error(path: &Path, e: csv::Error) -> TractcheckError {
    TractcheckError::table(path, e.to_string())
}
