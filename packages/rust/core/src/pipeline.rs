//! End-to-end `run` pipeline: reference tables → dataset → geocode → annotate.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use tractcheck_geocoder::{CensusGeocoder, Geocode};
use tractcheck_shared::{AppConfig, GeocoderConfig, PipelineConfig, Result, TractcheckError};

use crate::progress::ProgressReporter;
use crate::reference::ReferenceIndex;
use crate::scheduler::{RunSummary, Scheduler};
use crate::worker::RowContext;

/// Configuration for the [`enrich`] pipeline.
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    /// Stations CSV.
    pub input: PathBuf,
    /// Low-income community reference table.
    pub low_income: PathBuf,
    /// NMTC reference table.
    pub nmtc: PathBuf,
    /// Annotated output CSV.
    pub output: PathBuf,
    /// Open-date substring; empty keeps every row.
    pub date_filter: String,
    /// Settings with CLI overrides already applied.
    pub app: AppConfig,
}

/// Result of the [`enrich`] pipeline.
#[derive(Debug, Clone)]
pub struct EnrichResult {
    pub summary: RunSummary,
    pub output: PathBuf,
    /// Dataset rows before the date filter.
    pub rows_read: usize,
    /// Rows that passed the filter and were scheduled.
    pub rows_kept: usize,
}

/// Output path used when none is given: `<input stem>_qualified.csv` next to
/// the input.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "stations".to_string());
    input.with_file_name(format!("{stem}_qualified.csv"))
}

/// Run the full pipeline against the Census geocoder.
pub async fn enrich(
    config: &EnrichConfig,
    progress: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<EnrichResult> {
    let geocoder =
        CensusGeocoder::new(&GeocoderConfig::from(&config.app))?.with_cancellation(cancel.clone());
    enrich_with(config, geocoder, progress, cancel).await
}

/// Run the full pipeline with any geocoder.
///
/// 1. Validate settings
/// 2. Load both reference tables into a [`ReferenceIndex`]
/// 3. Load and filter the dataset
/// 4. Schedule every row
/// 5. Write the annotated table
///
/// Everything that can fail fatally is checked before the first request.
#[instrument(skip_all, fields(input = %config.input.display(), date_filter = %config.date_filter))]
pub async fn enrich_with<G: Geocode>(
    config: &EnrichConfig,
    geocoder: G,
    progress: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<EnrichResult> {
    let pipeline = PipelineConfig::from(&config.app);
    pipeline.validate()?;

    let geoid_length = config.app.pipeline.geoid_length;
    if pipeline.tract_suffix_len >= geoid_length {
        return Err(TractcheckError::config(format!(
            "tract_suffix_len ({}) must be shorter than geoid_length ({geoid_length})",
            pipeline.tract_suffix_len
        )));
    }
    let tract_len = geoid_length - pipeline.tract_suffix_len;

    // --- Phase 1: Reference tables ---
    progress.phase("Loading reference tables");
    let low_income =
        tractcheck_tables::read_reference(&config.low_income, &config.app.low_income, tract_len)?;
    let nmtc = tractcheck_tables::read_reference(&config.nmtc, &config.app.nmtc, tract_len)?;
    let index = ReferenceIndex::build(low_income, nmtc);

    // --- Phase 2: Dataset ---
    progress.phase("Loading dataset");
    let dataset =
        tractcheck_tables::read_dataset(&config.input, &config.app.dataset, &config.date_filter)?;
    if dataset.records.is_empty() {
        warn!(rows_read = dataset.rows_read, "no rows matched the date filter");
    }

    // --- Phase 3: Geocode and resolve ---
    let scheduler = Scheduler::new(
        RowContext::new(geocoder, index, pipeline.tract_suffix_len),
        pipeline,
    )?;
    let outcome = scheduler.run(dataset.records.clone(), progress, cancel).await?;

    // --- Phase 4: Output ---
    progress.phase("Writing annotated table");
    tractcheck_tables::write_annotated(
        &config.output,
        &dataset,
        &config.app.dataset.output_column,
        &outcome.table.entries(),
    )?;

    info!(
        output = %config.output.display(),
        rows_read = dataset.rows_read,
        rows_kept = dataset.records.len(),
        "pipeline complete"
    );

    Ok(EnrichResult {
        summary: outcome.summary,
        output: config.output.clone(),
        rows_read: dataset.rows_read,
        rows_kept: dataset.records.len(),
    })
}

/// Write a run summary as pretty-printed JSON.
pub fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| TractcheckError::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json).map_err(|e| TractcheckError::io(path, e))
}
