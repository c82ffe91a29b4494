//! Shared types, error model, and configuration for tractcheck.
//!
//! This crate is the foundation depended on by all other tractcheck crates.
//! It provides:
//! - [`TractcheckError`]: the unified error type
//! - Domain types ([`Record`], [`BlockGeoid`], [`Verdict`], [`SkipReason`], [`RunId`])
//! - Configuration ([`AppConfig`], [`GeocoderConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DatasetColumns, GeocoderConfig, GeocoderSection, PipelineConfig, PipelineSection,
    ReferenceColumns, RetryPolicy, config_dir, config_file_path, init_config, load_config,
    load_config_from,
};
pub use error::{Result, TractcheckError};
pub use types::{Address, BlockGeoid, Record, RunId, SkipReason, Verdict};
