//! Percentile threshold stage.
//!
//! Computes the configured percentile of the value column over the cleaned
//! table and keeps only rows strictly above it.

use crate::config::DEFAULT_PERCENTILE;
use crate::error::{EtlError, Result, ResultExt};
use crate::store::{TabularStore, replace_table, require_column};
use crate::types::ThresholdResult;
use polars::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Parse a percentile setting, falling back to [`DEFAULT_PERCENTILE`].
///
/// Anything that is not a finite number in `[0, 100]` is replaced by the
/// default with a warning. Never fails.
pub fn parse_percentile(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && (0.0..=100.0).contains(&value) => value,
        Ok(value) => {
            warn!(
                "Percentile {} is outside [0, 100]. Resorting to default value of {}",
                value, DEFAULT_PERCENTILE
            );
            DEFAULT_PERCENTILE
        }
        Err(_) => {
            warn!(
                "Input percentile '{}' is not a float number. Resorting to default value of {}",
                raw, DEFAULT_PERCENTILE
            );
            DEFAULT_PERCENTILE
        }
    }
}

/// Linear-interpolation percentile of `values`.
///
/// Sorts in place. The rank is `p / 100 * (n - 1)`; the result interpolates
/// between the order statistics either side of it. Returns `None` for an
/// empty slice. `values` must not contain NaN.
pub fn linear_percentile(values: &mut [f64], percentile: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);

    let rank = (percentile / 100.0).clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;

    let low = values[lower];
    let high = values[upper];
    Some(low + fraction * (high - low))
}

/// Non-null, non-NaN values of `column` as f64.
fn valid_values(df: &DataFrame, column: &str) -> Result<Vec<f64>> {
    let values = df
        .column(column)?
        .cast(&DataType::Float64)
        .context(format!("Column '{}' is not numeric", column))?;

    Ok(values
        .f64()?
        .into_iter()
        .flatten()
        .filter(|v| !v.is_nan())
        .collect())
}

/// Computes the threshold and writes the rows above it.
#[derive(Clone)]
pub struct ThresholdTransformStage {
    store: Arc<dyn TabularStore>,
    column: String,
}

impl ThresholdTransformStage {
    /// Create a stage that thresholds on `column`.
    pub fn new(store: Arc<dyn TabularStore>, column: impl Into<String>) -> Self {
        Self {
            store,
            column: column.into(),
        }
    }

    /// Threshold of `df` at `percentile`.
    ///
    /// Fails with [`EtlError::NoValidValues`] when the column has no usable
    /// value.
    pub fn compute_threshold(&self, df: &DataFrame, percentile: f64) -> Result<f64> {
        require_column(df, &self.column)?;
        let mut values = valid_values(df, &self.column)?;
        linear_percentile(&mut values, percentile)
            .ok_or_else(|| EtlError::NoValidValues(self.column.clone()))
    }

    /// Rows of `df` whose value is strictly greater than `threshold`.
    ///
    /// NaN is never selected, matching the values the threshold is computed
    /// from.
    pub fn select_above(&self, df: DataFrame, threshold: f64) -> Result<DataFrame> {
        let value = col(self.column.as_str()).cast(DataType::Float64);
        let selected = df
            .lazy()
            .filter(value.clone().gt(lit(threshold)).and(value.is_not_nan()))
            .collect()
            .context("Failed to select rows above threshold")?;
        Ok(selected)
    }

    /// Read `source`, keep the rows above the percentile threshold and write
    /// them to `destination`.
    pub fn transform(
        &self,
        source: &Path,
        destination: &Path,
        percentile_setting: &str,
    ) -> Result<ThresholdResult> {
        info!("Reading {} for analysis", source.display());
        let df = self.store.read(source).inspect_err(|e| {
            error!("Error in reading {}: {}", source.display(), e);
        })?;

        let percentile = parse_percentile(percentile_setting);
        let threshold = self.compute_threshold(&df, percentile).inspect_err(|e| {
            error!("Cannot compute percentile threshold: {}", e);
        })?;
        info!(
            "{}th percentile of {} is {}",
            percentile, self.column, threshold
        );

        info!("Filtering out records at or below the threshold");
        let mut selected = self.select_above(df, threshold)?;
        let selected_rows = selected.height();
        info!(
            "Number of records with {} above the {}th percentile is {}",
            self.column, percentile, selected_rows
        );

        replace_table(self.store.as_ref(), &mut selected, destination)?;
        info!("Done writing analysis file {}", destination.display());

        Ok(ThresholdResult {
            percentile,
            threshold,
            selected_rows,
            output_path: destination.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ParquetStore;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    const COLUMN: &str = "trip_distance";

    fn decade_df() -> DataFrame {
        df![COLUMN => [5.0, 15.0, 25.0, 35.0, 45.0, 55.0, 65.0, 75.0, 85.0, 95.0]].unwrap()
    }

    fn stage() -> ThresholdTransformStage {
        ThresholdTransformStage::new(Arc::new(ParquetStore), COLUMN)
    }

    // ==================== parse_percentile tests ====================

    #[test]
    fn test_parse_percentile_valid() {
        assert_eq!(parse_percentile("90"), 90.0);
        assert_eq!(parse_percentile(" 75.5 "), 75.5);
        assert_eq!(parse_percentile("0"), 0.0);
        assert_eq!(parse_percentile("100"), 100.0);
    }

    #[test]
    fn test_parse_percentile_falls_back() {
        assert_eq!(parse_percentile("not-a-number"), DEFAULT_PERCENTILE);
        assert_eq!(parse_percentile(""), DEFAULT_PERCENTILE);
        assert_eq!(parse_percentile("NaN"), DEFAULT_PERCENTILE);
        assert_eq!(parse_percentile("inf"), DEFAULT_PERCENTILE);
        assert_eq!(parse_percentile("101"), DEFAULT_PERCENTILE);
        assert_eq!(parse_percentile("-5"), DEFAULT_PERCENTILE);
    }

    // ==================== linear_percentile tests ====================

    #[test]
    fn test_linear_percentile_interpolates() {
        let mut values = vec![95.0, 5.0, 15.0, 25.0, 35.0, 45.0, 55.0, 65.0, 75.0, 85.0];
        // rank = 0.9 * 9 = 8.1 -> 85 + 0.1 * (95 - 85)
        let p90 = linear_percentile(&mut values, 90.0).unwrap();
        assert!((p90 - 86.0).abs() < 1e-9);
    }

    #[test]
    fn test_linear_percentile_bounds_and_median() {
        let mut values = vec![3.0, 1.0, 2.0, 4.0];
        assert_eq!(linear_percentile(&mut values, 0.0), Some(1.0));
        assert_eq!(linear_percentile(&mut values, 100.0), Some(4.0));
        assert_eq!(linear_percentile(&mut values, 50.0), Some(2.5));
    }

    #[test]
    fn test_linear_percentile_single_and_empty() {
        assert_eq!(linear_percentile(&mut [7.0], 90.0), Some(7.0));
        assert_eq!(linear_percentile(&mut [], 90.0), None);
    }

    // ==================== threshold/selection tests ====================

    #[test]
    fn test_threshold_and_selection_on_decades() {
        let stage = stage();
        let df = decade_df();

        let threshold = stage.compute_threshold(&df, 90.0).unwrap();
        assert!((threshold - 86.0).abs() < 1e-9);

        let selected = stage.select_above(df, threshold).unwrap();
        let values: Vec<f64> = selected
            .column(COLUMN)
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(values, vec![95.0]);
    }

    #[test]
    fn test_value_equal_to_threshold_is_excluded() {
        let stage = stage();
        let df = df![COLUMN => [1.0, 2.0, 3.0, 4.0, 5.0]].unwrap();

        // rank = 0.5 * 4 = 2 -> exactly the value 3.0
        let threshold = stage.compute_threshold(&df, 50.0).unwrap();
        assert_eq!(threshold, 3.0);

        let selected = stage.select_above(df, threshold).unwrap();
        assert_eq!(selected.height(), 2);
    }

    #[test]
    fn test_nulls_and_nan_are_ignored() {
        let stage = stage();
        let df = df![COLUMN => [Some(1.0), None, Some(f64::NAN), Some(3.0)]].unwrap();
        assert_eq!(stage.compute_threshold(&df, 50.0).unwrap(), 2.0);
    }

    #[test]
    fn test_nan_is_never_above_threshold() {
        let stage = stage();
        let df = df![COLUMN => [1.0, 2.0, 3.0, f64::NAN]].unwrap();

        let threshold = stage.compute_threshold(&df, 50.0).unwrap();
        assert_eq!(threshold, 2.0);

        let selected = stage.select_above(df, threshold).unwrap();
        let values: Vec<f64> = selected
            .column(COLUMN)
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(values, vec![3.0]);
    }

    #[test]
    fn test_empty_column_is_no_valid_values() {
        let stage = stage();
        let empty = df![COLUMN => Vec::<f64>::new()].unwrap();
        let err = stage.compute_threshold(&empty, 90.0).unwrap_err();
        assert_eq!(err.error_code(), "NO_VALID_VALUES");

        let all_null = df![COLUMN => [None::<f64>, None]].unwrap();
        let err = stage.compute_threshold(&all_null, 90.0).unwrap_err();
        assert!(matches!(err, EtlError::NoValidValues(c) if c == COLUMN));
    }

    #[test]
    fn test_transform_writes_analysis_file() {
        let dir = tempdir().unwrap();
        let staging = dir.path().join("staging_data.parquet");
        let analysis = dir.path().join("analysis_data.parquet");

        let mut df = decade_df();
        ParquetStore.write(&mut df, &staging).unwrap();

        let result = stage().transform(&staging, &analysis, "90").unwrap();

        assert_eq!(result.percentile, 90.0);
        assert!((result.threshold - 86.0).abs() < 1e-9);
        assert_eq!(result.selected_rows, 1);
        assert_eq!(result.output_path, analysis);
        assert_eq!(ParquetStore.read(&analysis).unwrap().height(), 1);
    }

    #[test]
    fn test_transform_with_unparseable_percentile_uses_default() {
        let dir = tempdir().unwrap();
        let staging = dir.path().join("staging.parquet");
        let analysis = dir.path().join("analysis.parquet");

        let mut df = decade_df();
        ParquetStore.write(&mut df, &staging).unwrap();

        let result = stage()
            .transform(&staging, &analysis, "not-a-number")
            .unwrap();
        assert_eq!(result.percentile, DEFAULT_PERCENTILE);
        assert_eq!(result.selected_rows, 1);
    }

    #[test]
    fn test_transform_empty_table_is_fatal_and_writes_nothing() {
        let dir = tempdir().unwrap();
        let staging = dir.path().join("staging.parquet");
        let analysis = dir.path().join("analysis.parquet");

        let mut df = df![COLUMN => Vec::<f64>::new()].unwrap();
        ParquetStore.write(&mut df, &staging).unwrap();

        let err = stage().transform(&staging, &analysis, "90").unwrap_err();
        assert_eq!(err.error_code(), "NO_VALID_VALUES");
        assert!(!analysis.exists());
    }
}
