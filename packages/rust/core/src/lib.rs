//! Core pipeline orchestration and domain logic for tractcheck.
//!
//! This crate ties the reference tables, the geocoder and the CSV layer
//! together: [`ReferenceIndex`] and [`resolve`] decide eligibility for a
//! block, [`Scheduler`] runs rows with bounded concurrency, and [`enrich`]
//! is the end-to-end workflow behind `tractcheck run`.

pub mod pipeline;
pub mod progress;
pub mod reference;
pub mod resolver;
pub mod results;
pub mod scheduler;
pub mod worker;

pub use pipeline::{
    EnrichConfig, EnrichResult, default_output_path, enrich, enrich_with, write_summary,
};
pub use progress::{
    ProgressCounters, ProgressReporter, ProgressSnapshot, ProgressTier, SilentProgress,
};
pub use reference::{Contribution, ReferenceIndex, TractLookup};
pub use resolver::resolve;
pub use results::ResultTable;
pub use scheduler::{RunOutcome, RunSummary, Scheduler};
pub use worker::{RowContext, process};
