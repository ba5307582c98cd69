//! Filesystem helpers shared by the stages.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info};

/// Outcome of [`remove_if_exists`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRemoval {
    /// A file was present and has been deleted.
    Removed,
    /// Nothing was at the path.
    Absent,
}

/// Delete the file at `path`, treating a missing file as success.
///
/// Only errors other than "not found" are returned.
pub fn remove_if_exists(path: &Path) -> std::io::Result<FileRemoval> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed existing file {}", path.display());
            Ok(FileRemoval::Removed)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No existing file to delete at {}", path.display());
            Ok(FileRemoval::Absent)
        }
        Err(e) => Err(e),
    }
}

/// Create the parent directory of `path` if it has one and it is missing.
pub fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Whether `path` should be treated as CSV rather than Parquet.
pub fn is_csv_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}
