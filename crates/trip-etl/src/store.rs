//! Columnar table storage.
//!
//! Stages never touch file formats directly; they go through a
//! [`TabularStore`]. The default [`ParquetStore`] writes Parquet, and reads
//! or writes CSV for paths ending in `.csv`.

use crate::error::{EtlError, Result};
use crate::utils::{FileRemoval, ensure_parent_dir, is_csv_path, remove_if_exists};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::{debug, error, info};

/// Reads and writes whole tables by path.
pub trait TabularStore: Send + Sync {
    /// Read the table stored at `path`.
    ///
    /// Fails with [`EtlError::Read`] when the file is missing or cannot be
    /// decoded.
    fn read(&self, path: &Path) -> Result<DataFrame>;

    /// Write `df` to `path`, replacing whatever is there.
    ///
    /// Fails with [`EtlError::Write`].
    fn write(&self, df: &mut DataFrame, path: &Path) -> Result<()>;
}

/// Parquet-backed store with CSV support by extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParquetStore;

impl ParquetStore {
    fn read_csv(path: &Path) -> PolarsResult<DataFrame> {
        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(1000))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()
    }
}

impl TabularStore for ParquetStore {
    fn read(&self, path: &Path) -> Result<DataFrame> {
        let read_err = |reason: String| EtlError::Read {
            path: path.to_path_buf(),
            reason,
        };

        let df = if is_csv_path(path) {
            Self::read_csv(path).map_err(|e| read_err(e.to_string()))?
        } else {
            let file = File::open(path).map_err(|e| read_err(e.to_string()))?;
            ParquetReader::new(file)
                .finish()
                .map_err(|e| read_err(e.to_string()))?
        };

        debug!("Read {:?} from {}", df.shape(), path.display());
        Ok(df)
    }

    fn write(&self, df: &mut DataFrame, path: &Path) -> Result<()> {
        let write_err = |reason: String| EtlError::Write {
            path: path.to_path_buf(),
            reason,
        };

        ensure_parent_dir(path).map_err(|e| write_err(e.to_string()))?;
        let mut file = File::create(path).map_err(|e| write_err(e.to_string()))?;

        if is_csv_path(path) {
            CsvWriter::new(&mut file)
                .include_header(true)
                .with_separator(b',')
                .finish(df)
                .map_err(|e| write_err(e.to_string()))?;
        } else {
            ParquetWriter::new(&mut file)
                .finish(df)
                .map_err(|e| write_err(e.to_string()))?;
        }

        debug!("Wrote {:?} to {}", df.shape(), path.display());
        Ok(())
    }
}

/// Delete any file at `path`, then write `df` there.
///
/// A missing file is not an error. Any other failure to delete, and any
/// failure to write, is logged and returned as [`EtlError::Write`].
pub fn replace_table(store: &dyn TabularStore, df: &mut DataFrame, path: &Path) -> Result<()> {
    info!("Deleting pre-existing file {}", path.display());
    match remove_if_exists(path) {
        Ok(FileRemoval::Removed) | Ok(FileRemoval::Absent) => {}
        Err(e) => {
            error!("Not able to remove {}: {}", path.display(), e);
            return Err(EtlError::Write {
                path: path.to_path_buf(),
                reason: format!("could not remove previous file: {}", e),
            });
        }
    }

    store.write(df, path).inspect_err(|e| {
        error!("Not able to write {}: {}", path.display(), e);
    })
}

/// Resolve a column name against a table, failing with
/// [`EtlError::ColumnNotFound`].
pub(crate) fn require_column(df: &DataFrame, column: &str) -> Result<()> {
    if df.get_column_names().iter().any(|name| name.as_str() == column) {
        Ok(())
    } else {
        Err(EtlError::ColumnNotFound(column.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn sample_df() -> DataFrame {
        df![
            "trip_distance" => [Some(1.5), None, Some(12.0)],
            "vendor" => ["a", "b", "c"],
        ]
        .unwrap()
    }

    #[test]
    fn test_parquet_round_trip_preserves_columns_and_nulls() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("table.parquet");
        let mut df = sample_df();

        ParquetStore.write(&mut df, &path).unwrap();
        let back = ParquetStore.read(&path).unwrap();

        assert!(back.equals_missing(&df));
    }

    #[test]
    fn test_csv_by_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("table.csv");
        let mut df = sample_df();

        ParquetStore.write(&mut df, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("trip_distance,vendor"));

        let back = ParquetStore.read(&path).unwrap();
        assert_eq!(back.shape(), (3, 2));
        assert_eq!(back.column("trip_distance").unwrap().null_count(), 1);
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out/nested/table.parquet");
        let mut df = sample_df();

        ParquetStore.write(&mut df, &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_read_missing_file_is_read_error() {
        let dir = tempdir().unwrap();
        let err = ParquetStore
            .read(&dir.path().join("missing.parquet"))
            .unwrap_err();
        assert_eq!(err.error_code(), "READ_FAILED");
    }

    #[test]
    fn test_read_corrupt_file_is_read_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corrupt.parquet");
        fs::write(&path, b"definitely not parquet").unwrap();

        let err = ParquetStore.read(&path).unwrap_err();
        assert_eq!(err.error_code(), "READ_FAILED");
    }

    #[test]
    fn test_write_into_directory_is_write_error() {
        let dir = tempdir().unwrap();
        let mut df = sample_df();
        let err = ParquetStore.write(&mut df, dir.path()).unwrap_err();
        assert_eq!(err.error_code(), "WRITE_FAILED");
    }

    #[test]
    fn test_replace_table_overwrites_and_tolerates_absence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("staging.parquet");

        let mut first = sample_df();
        replace_table(&ParquetStore, &mut first, &path).unwrap();

        let mut second = df!["trip_distance" => [7.0]].unwrap();
        replace_table(&ParquetStore, &mut second, &path).unwrap();

        let back = ParquetStore.read(&path).unwrap();
        assert_eq!(back.shape(), (1, 1));
    }

    #[test]
    fn test_replace_table_directory_target_is_write_error() {
        let dir = tempdir().unwrap();
        let mut df = sample_df();
        let err = replace_table(&ParquetStore, &mut df, dir.path()).unwrap_err();
        assert_eq!(err.error_code(), "WRITE_FAILED");
        assert!(dir.path().is_dir());
    }

    #[test]
    fn test_require_column() {
        let df = sample_df();
        assert!(require_column(&df, "trip_distance").is_ok());
        assert!(matches!(
            require_column(&df, "fare"),
            Err(EtlError::ColumnNotFound(c)) if c == "fare"
        ));
    }
}
