use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Row count after one filter step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterStep {
    pub description: String,
    pub rows_remaining: usize,
}

/// What the cleaning stage did to the raw table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CleaningReport {
    pub rows_read: usize,
    /// One entry per predicate, in application order.
    pub steps: Vec<FilterStep>,
    pub output_path: PathBuf,
}

impl CleaningReport {
    /// Rows left after the last predicate.
    pub fn rows_retained(&self) -> usize {
        self.steps
            .last()
            .map(|step| step.rows_remaining)
            .unwrap_or(self.rows_read)
    }

    /// Rows dropped across all predicates.
    pub fn rows_removed(&self) -> usize {
        self.rows_read.saturating_sub(self.rows_retained())
    }
}

/// Outcome of the threshold stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdResult {
    /// Percentile actually used, after any fallback.
    pub percentile: f64,
    pub threshold: f64,
    pub selected_rows: usize,
    pub output_path: PathBuf,
}

/// Final report of a successful pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub output_path: PathBuf,
    pub selected_rows: usize,
    pub threshold: f64,
    pub percentile: f64,
    pub bytes_downloaded: u64,
    pub rows_read: usize,
    pub rows_after_cleaning: usize,
    pub duration_ms: u64,
}

const RULE: &str =
    "*******************************************************************************";
const TITLE: &str =
    "**********************        SUMMARY           *******************************";

impl fmt::Display for PipelineSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", RULE)?;
        writeln!(f, "{}", TITLE)?;
        writeln!(f, "{}", RULE)?;
        writeln!(f)?;
        writeln!(
            f,
            "Data Set has been written to {}",
            self.output_path.display()
        )?;
        writeln!(
            f,
            "Number of records in the result data set = {}",
            self.selected_rows
        )?;
        writeln!(f)?;
        write!(f, "{}", RULE)
    }
}
