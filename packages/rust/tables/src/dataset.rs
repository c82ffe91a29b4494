//! Stations dataset reader.

use std::path::{Path, PathBuf};

use regex::{Regex, RegexBuilder};
use tracing::{info, instrument};

use tractcheck_shared::{Address, DatasetColumns, Record, Result, TractcheckError};

use crate::{column_index, csv_error, open_reader};

/// One kept row of the source file, with every original column.
#[derive(Debug, Clone)]
pub struct DatasetRow {
    /// Zero-based position of the row in the source file (header excluded).
    pub index: usize,
    pub fields: csv::StringRecord,
}

/// The filtered stations table.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub path: PathBuf,
    pub headers: csv::StringRecord,
    /// Rows that passed the date filter, in file order.
    pub rows: Vec<DatasetRow>,
    /// Address records for `rows`, same order and indices.
    pub records: Vec<Record>,
    /// Rows read before filtering.
    pub rows_read: usize,
}

/// Read the stations CSV and keep rows whose open date contains `date_filter`
/// (case-insensitive). An empty filter keeps every row.
#[instrument(skip_all, fields(path = %path.display(), date_filter = %date_filter))]
pub fn read_dataset(path: &Path, columns: &DatasetColumns, date_filter: &str) -> Result<Dataset> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers().map_err(|e| csv_error(path, e))?.clone();

    let street = column_index(path, &headers, &columns.street)?;
    let city = column_index(path, &headers, &columns.city)?;
    let state = column_index(path, &headers, &columns.state)?;
    let zip = column_index(path, &headers, &columns.zip)?;
    let open_date = column_index(path, &headers, &columns.open_date)?;

    let filter = date_matcher(date_filter)?;

    let mut rows = Vec::new();
    let mut records = Vec::new();
    let mut rows_read = 0;

    for (index, result) in reader.records().enumerate() {
        let fields = result.map_err(|e| csv_error(path, e))?;
        rows_read += 1;

        let date = fields.get(open_date).map(str::trim).filter(|d| !d.is_empty());
        if let Some(filter) = &filter {
            match date {
                Some(d) if filter.is_match(d) => {}
                _ => continue,
            }
        }

        let cell = |i: usize| fields.get(i).unwrap_or("").trim().to_string();
        records.push(Record {
            index,
            address: Address {
                street: cell(street),
                city: cell(city),
                state: cell(state),
                zip: cell(zip),
            },
            open_date: date.map(str::to_string),
        });
        rows.push(DatasetRow { index, fields });
    }

    info!(rows_read, rows_kept = rows.len(), "dataset loaded");

    Ok(Dataset {
        path: path.to_path_buf(),
        headers,
        rows,
        records,
        rows_read,
    })
}

/// Case-insensitive literal substring matcher; `None` for an empty filter.
fn date_matcher(date_filter: &str) -> Result<Option<Regex>> {
    let trimmed = date_filter.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    RegexBuilder::new(&regex::escape(trimmed))
        .case_insensitive(true)
        .build()
        .map(Some)
        .map_err(|e| TractcheckError::validation(format!("invalid date filter '{trimmed}': {e}")))
}
