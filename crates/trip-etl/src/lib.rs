//! Trip Dataset ETL Pipeline
//!
//! A batch pipeline built on Polars that downloads a tabular trip dataset,
//! removes invalid and outlier rows, and extracts the rows above a
//! percentile threshold.
//!
//! # Overview
//!
//! The pipeline runs three stages in order, each fully materializing its
//! output before the next starts:
//!
//! - **Extract**: download the raw dataset, replacing any previous copy
//! - **Clean**: drop rows failing an ordered list of predicates
//!   (`value > 0`, `value` not null, `value <= 50`) and write a staging file
//! - **Transform**: compute the configured percentile of the value column
//!   with linear interpolation and keep rows strictly above it
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use trip_etl::{Pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::load("config/config.toml")?;
//! let mut pipeline = Pipeline::builder()
//!     .config(config)
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?;
//!
//! pipeline.run()?;
//! println!("{}", pipeline.summarize()?);
//! ```
//!
//! # Stages on their own
//!
//! Every stage can be used without the orchestrator:
//!
//! ```rust,ignore
//! use trip_etl::{ParquetStore, RowFilterStage, default_predicates};
//! use std::sync::Arc;
//!
//! let stage = RowFilterStage::new(Arc::new(ParquetStore), "trip_distance");
//! let report = stage.clean(
//!     "raw.parquet".as_ref(),
//!     "staging.parquet".as_ref(),
//!     &default_predicates("trip_distance"),
//! )?;
//! ```

pub mod cleaner;
pub mod config;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod store;
pub mod transform;
pub mod types;
pub mod utils;

// Re-exports for convenient access
pub use cleaner::{FilterPredicate, RowFilterStage, apply_predicates, default_predicates};
pub use config::{ConfigValidationError, PipelineConfig, PipelineConfigBuilder};
pub use error::{EtlError, Result as EtlResult, ResultExt};
pub use extract::{Extractor, SourceFetcher, UrlFetcher};
pub use pipeline::{
    ClosureProgressReporter, Pipeline, PipelineBuilder, PipelineStage, ProgressReporter,
    ProgressUpdate,
};
pub use store::{ParquetStore, TabularStore, replace_table};
pub use transform::{ThresholdTransformStage, linear_percentile, parse_percentile};
pub use types::{CleaningReport, FilterStep, PipelineSummary, ThresholdResult};
pub use utils::{FileRemoval, remove_if_exists};
