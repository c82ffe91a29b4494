//! Annotated output writer.

use std::collections::HashMap;
use std::path::Path;

use tracing::{info, instrument};

use tractcheck_shared::{Result, TractcheckError, Verdict};

use crate::csv_error;
use crate::dataset::Dataset;

/// Header of the per-row skip reason column.
pub const SKIP_REASON_COLUMN: &str = "Skip Reason";

/// Text written to the eligibility column.
///
/// `None` covers both skipped rows and rows the run never reached.
pub fn verdict_cell(verdict: Option<&Verdict>) -> &'static str {
    match verdict.and_then(Verdict::qualifies) {
        Some(true) => "True",
        Some(false) => "False",
        None => "None",
    }
}

/// Write the dataset's kept rows with the eligibility and skip reason columns.
///
/// Layout: a leading unnamed column holding the original row index, every
/// source column, `output_column`, then [`SKIP_REASON_COLUMN`]. A row with no
/// entry in `verdicts` (or an unresolved entry) gets `None` and reason
/// `unresolved`.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn write_annotated(
    path: &Path,
    dataset: &Dataset,
    output_column: &str,
    verdicts: &[(usize, Option<Verdict>)],
) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| TractcheckError::io(parent, e))?;
    }

    let by_index: HashMap<usize, Option<Verdict>> = verdicts.iter().copied().collect();

    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;

    let mut header: Vec<&str> = Vec::with_capacity(dataset.headers.len() + 3);
    header.push("");
    header.extend(dataset.headers.iter());
    header.push(output_column);
    header.push(SKIP_REASON_COLUMN);
    writer.write_record(&header).map_err(|e| csv_error(path, e))?;

    for row in &dataset.rows {
        let verdict = by_index.get(&row.index).copied().flatten();
        let reason = match verdict {
            Some(Verdict::Skipped(reason)) => reason.as_str(),
            Some(_) => "",
            None => "unresolved",
        };

        let index = row.index.to_string();
        let mut record: Vec<&str> = Vec::with_capacity(header.len());
        record.push(&index);
        record.extend(row.fields.iter());
        // pad ragged rows so every line has the header's width
        while record.len() < dataset.headers.len() + 1 {
            record.push("");
        }
        record.push(verdict_cell(verdict.as_ref()));
        record.push(reason);
        writer.write_record(&record).map_err(|e| csv_error(path, e))?;
    }

    writer
        .flush()
        .map_err(|e| TractcheckError::io(path, e))?;

    info!(rows = dataset.rows.len(), "annotated table written");
    Ok(())
}
