//! Configuration for the ETL pipeline.
//!
//! The configuration is loaded once from a sectioned TOML file and is never
//! mutated afterwards; every stage receives what it needs at construction.
//!
//! ```toml
//! [ingestion]
//! file_url = "https://example.com/yellow_tripdata.parquet"
//! raw_datafile = "data/raw.parquet"
//!
//! [staging]
//! staging_datafile = "data/staging.parquet"
//!
//! [transform]
//! analysis_datafile = "data/analysis.parquet"
//! percentile_value = "90"
//!
//! [logging]
//! level = "INFO"
//! ```

use crate::error::{EtlError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_PATH_ENV: &str = "TRIP_ETL_CONFIG";

/// Percentile used when the configured value cannot be parsed.
pub const DEFAULT_PERCENTILE: f64 = 90.0;

/// Column the default predicates and the threshold operate on.
pub const DEFAULT_VALUE_COLUMN: &str = "trip_distance";

const DEFAULT_TIMEOUT_SECS: u64 = 300;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Read-only pipeline configuration.
///
/// Use [`PipelineConfig::load`] to read it from disk or
/// [`PipelineConfig::builder`] to construct it in code.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Remote location of the raw dataset (`ingestion.file_url`).
    pub source_url: String,

    /// Where the downloaded dataset is stored (`ingestion.raw_datafile`).
    pub raw_datafile: PathBuf,

    /// HTTP request timeout in seconds (`ingestion.timeout_secs`).
    pub download_timeout_secs: u64,

    /// Output of the cleaning stage (`staging.staging_datafile`).
    pub staging_datafile: PathBuf,

    /// Output of the transform stage (`transform.analysis_datafile`).
    pub analysis_datafile: PathBuf,

    /// Raw percentile setting. Parsed by the transform stage, which falls
    /// back to [`DEFAULT_PERCENTILE`] when it is not a number.
    pub percentile_value: String,

    /// Numeric column filtered and thresholded (`transform.column`).
    pub value_column: String,

    /// Log verbosity name (`logging.level`).
    pub log_level: String,
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Resolve the configuration path from the environment, falling back to
    /// [`DEFAULT_CONFIG_PATH`].
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Load and validate the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| EtlError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            EtlError::Config { reason, .. } => EtlError::Config {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content).map_err(|e| EtlError::Config {
            path: PathBuf::new(),
            reason: e.to_string(),
        })?;

        let config = PipelineConfig {
            source_url: file.ingestion.file_url,
            raw_datafile: file.ingestion.raw_datafile,
            download_timeout_secs: file.ingestion.timeout_secs,
            staging_datafile: file.staging.staging_datafile,
            analysis_datafile: file.transform.analysis_datafile,
            percentile_value: file.transform.percentile_value.into_string(),
            value_column: file.transform.column,
            log_level: file.logging.level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        if self.source_url.trim().is_empty() {
            return Err(ConfigValidationError::MissingValue("ingestion.file_url"));
        }

        let paths = [
            ("ingestion.raw_datafile", &self.raw_datafile),
            ("staging.staging_datafile", &self.staging_datafile),
            ("transform.analysis_datafile", &self.analysis_datafile),
        ];
        for (key, path) in paths {
            if path.as_os_str().is_empty() {
                return Err(ConfigValidationError::MissingValue(key));
            }
        }

        if self.value_column.trim().is_empty() {
            return Err(ConfigValidationError::MissingValue("transform.column"));
        }

        if self.download_timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidTimeout(
                self.download_timeout_secs,
            ));
        }

        Ok(())
    }

    /// Translate the configured level into a `tracing` filter directive.
    ///
    /// Accepts both `tracing` names (`debug`, `warn`) and the upper-case
    /// names of classic logging configs (`WARNING`, `CRITICAL`). Unknown
    /// names map to `info`.
    pub fn tracing_directive(&self) -> &'static str {
        match self.log_level.trim().to_ascii_lowercase().as_str() {
            "trace" | "notset" => "trace",
            "debug" => "debug",
            "warn" | "warning" => "warn",
            "error" | "critical" | "fatal" => "error",
            "off" => "off",
            _ => "info",
        }
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing value for '{0}'")]
    MissingValue(&'static str),

    #[error("Invalid download timeout: {0} (must be at least 1 second)")]
    InvalidTimeout(u64),
}

impl From<ConfigValidationError> for EtlError {
    fn from(err: ConfigValidationError) -> Self {
        EtlError::InvalidConfig(err.to_string())
    }
}

// On-disk layout, one struct per section.

#[derive(Debug, Deserialize)]
struct ConfigFile {
    ingestion: IngestionSection,
    staging: StagingSection,
    transform: TransformSection,
    #[serde(default)]
    logging: LoggingSection,
}

#[derive(Debug, Deserialize)]
struct IngestionSection {
    file_url: String,
    raw_datafile: PathBuf,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct StagingSection {
    staging_datafile: PathBuf,
}

#[derive(Debug, Deserialize)]
struct TransformSection {
    analysis_datafile: PathBuf,
    #[serde(default)]
    percentile_value: PercentileValue,
    #[serde(default = "default_value_column")]
    column: String,
}

#[derive(Debug, Deserialize)]
struct LoggingSection {
    #[serde(default = "default_log_level")]
    level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// `percentile_value` may be written quoted or bare; either way it is kept
/// as text and parsed later. Any other TOML value is kept as its TOML text
/// so the transform stage falls back to the default instead of the load
/// failing.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PercentileValue {
    Integer(i64),
    Float(f64),
    Text(String),
    Other(toml::Value),
}

impl Default for PercentileValue {
    fn default() -> Self {
        PercentileValue::Float(DEFAULT_PERCENTILE)
    }
}

impl PercentileValue {
    fn into_string(self) -> String {
        match self {
            PercentileValue::Integer(v) => v.to_string(),
            PercentileValue::Float(v) => v.to_string(),
            PercentileValue::Text(s) => s,
            PercentileValue::Other(v) => v.to_string(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_value_column() -> String {
    DEFAULT_VALUE_COLUMN.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    source_url: Option<String>,
    raw_datafile: Option<PathBuf>,
    download_timeout_secs: Option<u64>,
    staging_datafile: Option<PathBuf>,
    analysis_datafile: Option<PathBuf>,
    percentile_value: Option<String>,
    value_column: Option<String>,
    log_level: Option<String>,
}

impl PipelineConfigBuilder {
    /// Set the remote location of the raw dataset.
    pub fn source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Set where the downloaded dataset is stored.
    pub fn raw_datafile(mut self, path: impl Into<PathBuf>) -> Self {
        self.raw_datafile = Some(path.into());
        self
    }

    /// Set the HTTP request timeout in seconds.
    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.download_timeout_secs = Some(secs);
        self
    }

    /// Set the cleaning stage output path.
    pub fn staging_datafile(mut self, path: impl Into<PathBuf>) -> Self {
        self.staging_datafile = Some(path.into());
        self
    }

    /// Set the transform stage output path.
    pub fn analysis_datafile(mut self, path: impl Into<PathBuf>) -> Self {
        self.analysis_datafile = Some(path.into());
        self
    }

    /// Set the raw percentile setting (parsed later, see [`PipelineConfig`]).
    pub fn percentile_value(mut self, value: impl Into<String>) -> Self {
        self.percentile_value = Some(value.into());
        self
    }

    /// Set the numeric column to filter and threshold.
    pub fn value_column(mut self, column: impl Into<String>) -> Self {
        self.value_column = Some(column.into());
        self
    }

    /// Set the log verbosity name.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> std::result::Result<PipelineConfig, ConfigValidationError> {
        let config = PipelineConfig {
            source_url: self.source_url.unwrap_or_default(),
            raw_datafile: self.raw_datafile.unwrap_or_default(),
            download_timeout_secs: self.download_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            staging_datafile: self.staging_datafile.unwrap_or_default(),
            analysis_datafile: self.analysis_datafile.unwrap_or_default(),
            percentile_value: self
                .percentile_value
                .unwrap_or_else(|| DEFAULT_PERCENTILE.to_string()),
            value_column: self.value_column.unwrap_or_else(default_value_column),
            log_level: self.log_level.unwrap_or_else(default_log_level),
        };

        config.validate()?;
        Ok(config)
    }
}
