//! Error types for the ETL pipeline.
//!
//! Fatal failures (download, read, write, degenerate data) are all variants
//! of [`EtlError`]. Recoverable situations such as a missing file before a
//! delete or an unparseable percentile never surface here.
//!
//! Errors serialize as `{code, message}` so a caller can report them in a
//! machine-readable form.

use serde::Serialize;
use serde::ser::SerializeStruct;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the pipeline.
#[derive(Error, Debug)]
pub enum EtlError {
    /// The configuration file could not be loaded or parsed.
    #[error("Failed to load configuration from '{path}': {reason}")]
    Config { path: PathBuf, reason: String },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Downloading the raw dataset failed.
    #[error("Failed to download '{source_url}': {reason}")]
    Download { source_url: String, reason: String },

    /// Reading a table from disk failed.
    #[error("Failed to read table from '{path}': {reason}")]
    Read { path: PathBuf, reason: String },

    /// Writing a table to disk failed.
    #[error("Failed to write table to '{path}': {reason}")]
    Write { path: PathBuf, reason: String },

    /// Column was not found in the dataset.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// No valid values found in a column for computation.
    #[error("No valid values found in column '{0}'")]
    NoValidValues(String),

    /// A summary was requested before the pipeline completed a run.
    #[error("Pipeline has not completed a run")]
    NotRun,

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<EtlError>,
    },
}

impl EtlError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        EtlError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get a stable error code, independent of the message text.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "CONFIG_ERROR",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Download { .. } => "DOWNLOAD_FAILED",
            Self::Read { .. } => "READ_FAILED",
            Self::Write { .. } => "WRITE_FAILED",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::NoValidValues(_) => "NO_VALID_VALUES",
            Self::NotRun => "NOT_RUN",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Returns the innermost error, skipping any context wrappers.
    pub fn root(&self) -> &EtlError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this error came from reading or writing a file.
    pub fn is_io(&self) -> bool {
        matches!(
            self.root(),
            Self::Download { .. } | Self::Read { .. } | Self::Write { .. } | Self::Io(_)
        )
    }
}

impl Serialize for EtlError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("EtlError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, EtlError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| EtlError::Polars(e).with_context(context))
    }
}
