//! Row filtering stage.
//!
//! Reads the raw table, drops every row that fails one of an ordered list of
//! predicates, and writes what is left to the staging file. Rows are only
//! ever removed, never modified.

use crate::error::{Result, ResultExt};
use crate::store::{TabularStore, replace_table, require_column};
use crate::types::{CleaningReport, FilterStep};
use polars::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// Upper bound of a plausible value in the default predicate set.
pub const MAX_PLAUSIBLE_VALUE: f64 = 50.0;

/// A named row test.
///
/// A row is kept when `expr` evaluates to `true`; `false` and null both drop
/// it.
#[derive(Debug, Clone)]
pub struct FilterPredicate {
    description: String,
    expr: Expr,
}

impl FilterPredicate {
    /// Wrap an arbitrary boolean expression.
    pub fn new(description: impl Into<String>, expr: Expr) -> Self {
        Self {
            description: description.into(),
            expr,
        }
    }

    /// Keep rows where `column > bound`.
    pub fn greater_than(column: &str, bound: f64) -> Self {
        Self::new(
            format!("{} > {}", column, bound),
            numeric(column).gt(lit(bound)).and(not_nan(column)),
        )
    }

    /// Keep rows where `column <= bound`.
    pub fn at_most(column: &str, bound: f64) -> Self {
        Self::new(
            format!("{} <= {}", column, bound),
            numeric(column).lt_eq(lit(bound)).and(not_nan(column)),
        )
    }

    /// Keep rows where `column` is neither null nor NaN.
    pub fn not_missing(column: &str) -> Self {
        Self::new(
            format!("{} is not null", column),
            col(column).is_not_null().and(not_nan(column)),
        )
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

fn numeric(column: &str) -> Expr {
    col(column).cast(DataType::Float64)
}

// NaN sorts above every number in polars, so comparisons alone would let it
// through `> 0`.
fn not_nan(column: &str) -> Expr {
    numeric(column).is_not_nan()
}

/// The standard cleaning rules, in order:
///
/// 1. value > 0
/// 2. value is not null
/// 3. value <= 50
pub fn default_predicates(column: &str) -> Vec<FilterPredicate> {
    vec![
        FilterPredicate::greater_than(column, 0.0),
        FilterPredicate::not_missing(column),
        FilterPredicate::at_most(column, MAX_PLAUSIBLE_VALUE),
    ]
}

/// Applies row predicates to a table and persists the result.
#[derive(Clone)]
pub struct RowFilterStage {
    store: Arc<dyn TabularStore>,
    column: String,
}

impl RowFilterStage {
    /// Create a stage that filters on `column`.
    pub fn new(store: Arc<dyn TabularStore>, column: impl Into<String>) -> Self {
        Self {
            store,
            column: column.into(),
        }
    }

    /// Column the stage requires in its input.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Read `source`, filter it with `predicates`, write the result to
    /// `destination`.
    pub fn clean(
        &self,
        source: &Path,
        destination: &Path,
        predicates: &[FilterPredicate],
    ) -> Result<CleaningReport> {
        info!("Cleaning the raw dataset {}", source.display());

        let df = self.store.read(source).inspect_err(|e| {
            error!("Error in reading {}: {}", source.display(), e);
        })?;
        require_column(&df, &self.column)?;

        let rows_read = df.height();
        let (mut df, steps) = apply_predicates(df, predicates)?;

        replace_table(self.store.as_ref(), &mut df, destination)?;
        info!(
            "Done writing {} cleaned rows to {}",
            df.height(),
            destination.display()
        );

        Ok(CleaningReport {
            rows_read,
            steps,
            output_path: destination.to_path_buf(),
        })
    }
}

/// Filter `df` by each predicate in turn, recording the row count after
/// every step.
pub fn apply_predicates(
    df: DataFrame,
    predicates: &[FilterPredicate],
) -> Result<(DataFrame, Vec<FilterStep>)> {
    let mut df = df;
    let mut steps = Vec::with_capacity(predicates.len());

    for predicate in predicates {
        info!("Filtering out records failing {}", predicate.description());
        df = df
            .lazy()
            .filter(predicate.expr().clone())
            .collect()
            .context(format!("Failed to apply filter '{}'", predicate.description()))?;

        let rows_remaining = df.height();
        info!("After filtering the number of rows left is {}", rows_remaining);
        steps.push(FilterStep {
            description: predicate.description().to_string(),
            rows_remaining,
        });
    }

    Ok((df, steps))
}
