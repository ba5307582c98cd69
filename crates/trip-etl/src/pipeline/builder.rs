//! Main pipeline module.
//!
//! This module provides the [`Pipeline`] struct and its builder, which wire
//! the extract, clean and transform stages together.

use crate::cleaner::{FilterPredicate, RowFilterStage, default_predicates};
use crate::config::PipelineConfig;
use crate::error::{EtlError, Result, ResultExt};
use crate::extract::{Extractor, SourceFetcher, UrlFetcher};
use crate::pipeline::progress::{
    ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate,
};
use crate::store::{ParquetStore, TabularStore};
use crate::transform::ThresholdTransformStage;
use crate::types::{CleaningReport, PipelineSummary, ThresholdResult};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span};

/// The three-stage ETL pipeline.
///
/// Use [`Pipeline::builder()`] to create one.
///
/// # Example
///
/// ```rust,ignore
/// use trip_etl::{Pipeline, PipelineConfig};
///
/// let mut pipeline = Pipeline::builder()
///     .config(PipelineConfig::load("config/config.toml")?)
///     .build()?;
///
/// pipeline.run()?;
/// println!("{}", pipeline.summarize()?);
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    extractor: Extractor,
    cleaner: RowFilterStage,
    transformer: ThresholdTransformStage,
    predicates: Vec<FilterPredicate>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    last_run: Option<RunRecord>,
}

/// What a successful run leaves behind for the summary.
#[derive(Debug, Clone)]
struct RunRecord {
    bytes_downloaded: u64,
    cleaning: CleaningReport,
    threshold: ThresholdResult,
    duration: Duration,
}

static_assertions::assert_impl_all!(Pipeline: Send);

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// The configuration this pipeline was built with.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run extract, clean and transform in order.
    ///
    /// The first failing stage aborts the run; later stages do not start.
    /// A failed run clears the result of any earlier successful run.
    pub fn run(&mut self) -> Result<()> {
        self.last_run = None;

        match self.run_internal() {
            Ok(record) => {
                self.report_progress(ProgressUpdate::complete("Pipeline execution completed"));
                info!(
                    "Pipeline execution completed in {}ms",
                    record.duration.as_millis()
                );
                self.last_run = Some(record);
                Ok(())
            }
            Err(e) => {
                self.report_progress(ProgressUpdate::failed(e.to_string()));
                error!("Pipeline error: {}", e);
                Err(e)
            }
        }
    }

    /// Summary of the last successful run.
    ///
    /// Fails with [`EtlError::NotRun`] if [`run`](Self::run) has not
    /// succeeded yet.
    pub fn summarize(&self) -> Result<PipelineSummary> {
        let record = self.last_run.as_ref().ok_or(EtlError::NotRun)?;
        Ok(PipelineSummary {
            output_path: record.threshold.output_path.clone(),
            selected_rows: record.threshold.selected_rows,
            threshold: record.threshold.threshold,
            percentile: record.threshold.percentile,
            bytes_downloaded: record.bytes_downloaded,
            rows_read: record.cleaning.rows_read,
            rows_after_cleaning: record.cleaning.rows_retained(),
            duration_ms: record.duration.as_millis() as u64,
        })
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn run_internal(&self) -> Result<RunRecord> {
        let start_time = Instant::now();
        let config = &self.config;

        // Step 1: Extract
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Extract,
            0.0,
            "Starting extract of data",
        ));
        info!("Starting extract of data");
        let bytes_downloaded = info_span!("extract")
            .in_scope(|| {
                self.extractor
                    .extract(&config.source_url, &config.raw_datafile)
            })
            .context("Extract stage failed")?;
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Extract,
            1.0,
            format!("Downloaded {} bytes", bytes_downloaded),
        ));

        // Step 2: Clean
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Clean,
            0.0,
            "Starting cleaning of data",
        ));
        info!("Starting cleaning of data");
        let cleaning = info_span!("clean")
            .in_scope(|| {
                self.cleaner.clean(
                    &config.raw_datafile,
                    &config.staging_datafile,
                    &self.predicates,
                )
            })
            .context("Clean stage failed")?;
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Clean,
            1.0,
            format!(
                "Kept {} of {} rows",
                cleaning.rows_retained(),
                cleaning.rows_read
            ),
        ));

        // Step 3: Transform
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Transform,
            0.0,
            "Starting transform of data",
        ));
        info!("Starting transform of data");
        let threshold = info_span!("transform")
            .in_scope(|| {
                self.transformer.transform(
                    &config.staging_datafile,
                    &config.analysis_datafile,
                    &config.percentile_value,
                )
            })
            .context("Transform stage failed")?;
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Transform,
            1.0,
            format!(
                "Selected {} rows above {}",
                threshold.selected_rows, threshold.threshold
            ),
        ));

        Ok(RunRecord {
            bytes_downloaded,
            cleaning,
            threshold,
            duration: start_time.elapsed(),
        })
    }
}

/// Builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    fetcher: Option<Arc<dyn SourceFetcher>>,
    store: Option<Arc<dyn TabularStore>>,
    predicates: Option<Vec<FilterPredicate>>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

impl PipelineBuilder {
    /// Set the pipeline configuration. Required.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the download transport. Defaults to [`UrlFetcher`].
    pub fn fetcher(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Replace the table codec. Defaults to [`ParquetStore`].
    pub fn store(mut self, store: Arc<dyn TabularStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the cleaning predicates. Defaults to
    /// [`default_predicates`] on the configured column.
    pub fn predicates(mut self, predicates: Vec<FilterPredicate>) -> Self {
        self.predicates = Some(predicates);
        self
    }

    /// Set a progress reporter.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a closure to receive progress updates.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Build the pipeline.
    pub fn build(self) -> Result<Pipeline> {
        let config = self
            .config
            .ok_or_else(|| EtlError::InvalidConfig("Pipeline requires a configuration".into()))?;
        config.validate()?;

        let fetcher: Arc<dyn SourceFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(UrlFetcher::with_timeout(Duration::from_secs(
                config.download_timeout_secs,
            ))?),
        };
        let store: Arc<dyn TabularStore> = self.store.unwrap_or_else(|| Arc::new(ParquetStore));
        let predicates = self
            .predicates
            .unwrap_or_else(|| default_predicates(&config.value_column));

        Ok(Pipeline {
            extractor: Extractor::new(fetcher),
            cleaner: RowFilterStage::new(store.clone(), config.value_column.clone()),
            transformer: ThresholdTransformStage::new(store, config.value_column.clone()),
            predicates,
            progress_reporter: self.progress_reporter,
            last_run: None,
            config,
        })
    }
}
