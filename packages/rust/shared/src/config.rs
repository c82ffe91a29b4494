//! Application configuration for tractcheck.
//!
//! User config lives at `~/.tractcheck/tractcheck.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TractcheckError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "tractcheck.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".tractcheck";

// ---------------------------------------------------------------------------
// Config structs (matching tractcheck.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Geocoding service settings.
    #[serde(default)]
    pub geocoder: GeocoderSection,

    /// Scheduler and tract scheme settings.
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Column names of the stations dataset.
    #[serde(default)]
    pub dataset: DatasetColumns,

    /// Urban low-income communities table (2010 tracts).
    #[serde(default = "default_low_income_columns")]
    pub low_income: ReferenceColumns,

    /// NMTC low-income community table (2020 tracts).
    #[serde(default = "default_nmtc_columns")]
    pub nmtc: ReferenceColumns,
}

/// `[geocoder]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocoderSection {
    /// Geographies-by-address endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Geocoding reference benchmark identifier.
    #[serde(default = "default_benchmark")]
    pub benchmark: String,

    /// Geography vintage identifier.
    #[serde(default = "default_vintage")]
    pub vintage: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per row, counting the first. 1 disables retry.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the first retry; doubles on each further retry.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for a single backoff sleep.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for GeocoderSection {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            benchmark: default_benchmark(),
            vintage: default_vintage(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_endpoint() -> String {
    "https://geocoding.geo.census.gov/geocoder/geographies/address".into()
}
fn default_benchmark() -> String {
    "Public_AR_Census2020".into()
}
fn default_vintage() -> String {
    "Census2010_Census2020".into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    1
}
fn default_initial_backoff_ms() -> u64 {
    500
}
fn default_max_backoff_ms() -> u64 {
    8_000
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Rows per dispatched batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum rows in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Expected length of a block GEOID.
    #[serde(default = "default_geoid_length")]
    pub geoid_length: usize,

    /// Trailing characters stripped from a block GEOID to get the tract prefix.
    #[serde(default = "default_tract_suffix_len")]
    pub tract_suffix_len: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            geoid_length: default_geoid_length(),
            tract_suffix_len: default_tract_suffix_len(),
        }
    }
}

fn default_batch_size() -> usize {
    100
}
fn default_concurrency() -> usize {
    8
}
fn default_geoid_length() -> usize {
    15
}
fn default_tract_suffix_len() -> usize {
    4
}

/// `[dataset]` section: column names in the stations CSV.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetColumns {
    #[serde(default = "default_street_column")]
    pub street: String,
    #[serde(default = "default_city_column")]
    pub city: String,
    #[serde(default = "default_state_column")]
    pub state: String,
    #[serde(default = "default_zip_column")]
    pub zip: String,
    #[serde(default = "default_open_date_column")]
    pub open_date: String,
    /// Name of the column appended to the annotated output.
    #[serde(default = "default_output_column")]
    pub output_column: String,
}

impl Default for DatasetColumns {
    fn default() -> Self {
        Self {
            street: default_street_column(),
            city: default_city_column(),
            state: default_state_column(),
            zip: default_zip_column(),
            open_date: default_open_date_column(),
            output_column: default_output_column(),
        }
    }
}

fn default_street_column() -> String {
    "Street Address".into()
}
fn default_city_column() -> String {
    "City".into()
}
fn default_state_column() -> String {
    "State".into()
}
fn default_zip_column() -> String {
    "ZIP".into()
}
fn default_open_date_column() -> String {
    "Open Date".into()
}
fn default_output_column() -> String {
    "Qualify for Tax Benefits".into()
}

/// `[low_income]` / `[nmtc]` sections: which columns hold the tract and the flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceColumns {
    pub tract_column: String,
    pub flag_column: String,
}

fn default_low_income_columns() -> ReferenceColumns {
    ReferenceColumns {
        tract_column: "2010 Census Tract Number FIPS code. GEOID".into(),
        flag_column: "Urban Low Income Community (yes, no)".into(),
    }
}

fn default_nmtc_columns() -> ReferenceColumns {
    ReferenceColumns {
        tract_column: "2020 Census Tract Number FIPS code. GEOID".into(),
        flag_column: "Does Census Tract Qualify For NMTC Low-Income Community (LIC) on Poverty or Income Criteria?".into(),
    }
}

impl Default for ReferenceColumns {
    fn default() -> Self {
        default_low_income_columns()
    }
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Bounded retry policy applied at the geocode client boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per row, counting the first. Always at least 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// A single attempt, no retry.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Sleep before retry number `retry` (1-based): doubling, capped at `max_backoff`.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Runtime geocoder configuration.
#[derive(Debug, Clone)]
pub struct GeocoderConfig {
    pub endpoint: String,
    pub benchmark: String,
    pub vintage: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Expected block GEOID length; other lengths are treated as malformed.
    pub geoid_length: usize,
}

impl From<&AppConfig> for GeocoderConfig {
    fn from(config: &AppConfig) -> Self {
        let section = &config.geocoder;
        Self {
            endpoint: section.endpoint.clone(),
            benchmark: section.benchmark.clone(),
            vintage: section.vintage.clone(),
            timeout: Duration::from_secs(section.timeout_secs),
            retry: RetryPolicy {
                max_attempts: section.max_attempts.max(1),
                initial_backoff: Duration::from_millis(section.initial_backoff_ms),
                max_backoff: Duration::from_millis(section.max_backoff_ms),
            },
            geoid_length: config.pipeline.geoid_length,
        }
    }
}

/// Runtime scheduler configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub concurrency: usize,
    pub tract_suffix_len: usize,
}

impl PipelineConfig {
    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(TractcheckError::config("batch_size must be at least 1"));
        }
        if self.concurrency == 0 {
            return Err(TractcheckError::config("concurrency must be at least 1"));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            batch_size: config.pipeline.batch_size,
            concurrency: config.pipeline.concurrency,
            tract_suffix_len: config.pipeline.tract_suffix_len,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.tractcheck/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| TractcheckError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.tractcheck/tractcheck.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| TractcheckError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        TractcheckError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| TractcheckError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| TractcheckError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| TractcheckError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
