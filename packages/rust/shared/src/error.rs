//! Error types for tractcheck.
//!
//! Library crates use [`TractcheckError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Row-level geocoding failures are *not* errors: they are reported as
//! [`SkipReason`](crate::SkipReason)s inside a verdict. Everything here is
//! fatal for the run.

use std::path::PathBuf;

/// Top-level error type for all tractcheck operations.
#[derive(Debug, thiserror::Error)]
pub enum TractcheckError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error that is not tied to a single row (e.g. client setup).
    #[error("network error: {0}")]
    Network(String),

    /// Dataset or reference table could not be read or written.
    #[error("table error in {path:?}: {message}")]
    Table { path: PathBuf, message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (duplicate row index, bad batch size, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TractcheckError>;

impl TractcheckError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a table error for the given file.
    pub fn table(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Table {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
