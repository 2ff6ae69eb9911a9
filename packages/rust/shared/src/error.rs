//! Error types for the BODACC pipeline.
//!
//! Library crates use [`BodaccError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use chrono::NaiveDate;

use crate::types::Category;

/// Top-level error type for all pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum BodaccError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while talking to the announcement API.
    #[error("network error: {0}")]
    Network(String),

    /// Payload or record decoding error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad identifier file, bad artifact name, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The requested day window is empty.
    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    /// No usable identifier was loaded; filtering would match nothing.
    #[error("identifier registry {path:?} has no valid entries")]
    EmptyRegistry { path: PathBuf },

    /// Nothing to filter.
    #[error("no source artifacts found in {dir:?}")]
    NoSourceArtifacts { dir: PathBuf },

    /// Transient failures exhausted the retry budget for one (day, category).
    #[error(
        "gave up on {day} category {category} after {attempts} attempts \
         ({pages_staged} pages staged): {last_error}"
    )]
    RetriesExhausted {
        day: NaiveDate,
        category: Category,
        attempts: u32,
        pages_staged: usize,
        last_error: String,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BodaccError>;

impl BodaccError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
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

    /// Whether the day-range run may continue after this error.
    ///
    /// Only an exhausted retry budget is confined to its (day, category);
    /// everything else aborts the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. })
    }
}
