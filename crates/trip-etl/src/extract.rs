//! Extraction of the raw dataset.
//!
//! The [`Extractor`] clears the destination and hands the transfer to a
//! [`SourceFetcher`]. [`UrlFetcher`] is the default transport: HTTP(S) via a
//! blocking `reqwest` client, `file://` URLs and bare paths by local copy.

use crate::error::{EtlError, Result};
use crate::utils::{FileRemoval, ensure_parent_dir, remove_if_exists};
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Default timeout for a download in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Transfers a resource to a local file.
///
/// Implementations must overwrite `destination` and return the number of
/// bytes written. Any failure is reported as [`EtlError::Download`].
pub trait SourceFetcher: Send + Sync {
    /// Copy `source` into `destination`.
    fn fetch(&self, source: &str, destination: &Path) -> Result<u64>;

    /// Short name of the transport, used in logs.
    fn name(&self) -> &str;
}

/// Fetches `http(s)://` URLs over the network and everything else from the
/// local filesystem.
#[derive(Debug, Clone)]
pub struct UrlFetcher {
    client: Client,
}

impl UrlFetcher {
    /// Create a fetcher with the default timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a fetcher whose HTTP requests give up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EtlError::InvalidConfig(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn fetch_http(&self, url: &str, destination: &Path) -> std::result::Result<u64, String> {
        let mut response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| e.to_string())?;

        let mut file = File::create(destination).map_err(|e| e.to_string())?;
        response.copy_to(&mut file).map_err(|e| e.to_string())
    }

    fn fetch_local(path: &Path, destination: &Path) -> std::result::Result<u64, String> {
        fs::copy(path, destination).map_err(|e| e.to_string())
    }
}

impl SourceFetcher for UrlFetcher {
    fn fetch(&self, source: &str, destination: &Path) -> Result<u64> {
        ensure_parent_dir(destination).map_err(|e| EtlError::Download {
            source_url: source.to_string(),
            reason: e.to_string(),
        })?;

        let outcome = match classify_source(source) {
            SourceKind::Http => self.fetch_http(source, destination),
            SourceKind::Local(path) => Self::fetch_local(Path::new(path), destination),
        };

        outcome.map_err(|reason| {
            // Do not leave a truncated download behind.
            if let Err(e) = remove_if_exists(destination) {
                warn!("Could not remove partial download {}: {}", destination.display(), e);
            }
            EtlError::Download {
                source_url: source.to_string(),
                reason,
            }
        })
    }

    fn name(&self) -> &str {
        "url"
    }
}

enum SourceKind<'a> {
    Http,
    Local(&'a str),
}

fn classify_source(source: &str) -> SourceKind<'_> {
    let lower = source.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        SourceKind::Http
    } else if let Some(path) = source.strip_prefix("file://") {
        SourceKind::Local(path)
    } else {
        SourceKind::Local(source)
    }
}

/// Downloads the raw dataset, replacing any previous copy.
#[derive(Clone)]
pub struct Extractor {
    fetcher: Arc<dyn SourceFetcher>,
}

impl Extractor {
    /// Create an extractor that uses `fetcher` for the transfer.
    pub fn new(fetcher: Arc<dyn SourceFetcher>) -> Self {
        Self { fetcher }
    }

    /// Delete whatever is at `destination`, then download `source` into it.
    ///
    /// A failure to delete is logged and ignored; a failure to download is
    /// logged at error level and returned.
    pub fn extract(&self, source: &str, destination: &Path) -> Result<u64> {
        info!("Deleting file before downloading");
        match remove_if_exists(destination) {
            Ok(FileRemoval::Removed) => info!("Removed previous raw file {}", destination.display()),
            Ok(FileRemoval::Absent) => {}
            Err(e) => info!(
                "Not able to remove {}: {}. Continuing with download",
                destination.display(),
                e
            ),
        }

        info!("Extracting data from {} ({})", source, self.fetcher.name());
        let bytes = self.fetcher.fetch(source, destination).inspect_err(|e| {
            error!("Error when downloading file: {}", e);
        })?;

        info!(
            "Finished downloading {} bytes to {}",
            bytes,
            destination.display()
        );
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Records every call and writes a fixed payload.
    struct RecordingFetcher {
        calls: Mutex<Vec<(String, std::path::PathBuf)>>,
        payload: &'static [u8],
    }

    impl SourceFetcher for RecordingFetcher {
        fn fetch(&self, source: &str, destination: &Path) -> Result<u64> {
            self.calls
                .lock()
                .unwrap()
                .push((source.to_string(), destination.to_path_buf()));
            fs::write(destination, self.payload)?;
            Ok(self.payload.len() as u64)
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    #[test]
    fn test_extract_calls_fetcher_with_source_and_destination() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("raw_data.csv");
        let fetcher = Arc::new(RecordingFetcher {
            calls: Mutex::new(Vec::new()),
            payload: b"trip_distance\n1.0\n",
        });

        let extractor = Extractor::new(fetcher.clone());
        let bytes = extractor.extract("http://example.com/data.csv", &dest).unwrap();

        assert_eq!(bytes, 18);
        let calls = fetcher.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![("http://example.com/data.csv".to_string(), dest.clone())]
        );
    }

    #[test]
    fn test_extract_replaces_existing_file() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("raw.parquet");
        fs::write(&dest, b"old contents that are longer than the new ones").unwrap();

        let extractor = Extractor::new(Arc::new(RecordingFetcher {
            calls: Mutex::new(Vec::new()),
            payload: b"new",
        }));
        extractor.extract("http://example.com/raw", &dest).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"new");
    }

    /// Succeeds without touching the filesystem.
    struct NoopFetcher {
        calls: AtomicUsize,
    }

    impl SourceFetcher for NoopFetcher {
        fn fetch(&self, _source: &str, _destination: &Path) -> Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        }

        fn name(&self) -> &str {
            "noop"
        }
    }

    #[test]
    fn test_extract_continues_when_delete_fails() {
        let dir = tempdir().unwrap();
        // A non-empty directory cannot be removed as a file.
        let dest = dir.path().join("raw.parquet");
        fs::create_dir(&dest).unwrap();
        fs::write(dest.join("part-0"), b"x").unwrap();
        assert!(remove_if_exists(&dest).is_err());

        let fetcher = Arc::new(NoopFetcher {
            calls: AtomicUsize::new(0),
        });
        let extractor = Extractor::new(fetcher.clone());

        let bytes = extractor.extract("http://example.com/raw", &dest).unwrap();

        assert_eq!(bytes, 0);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_url_fetcher_copies_local_paths() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("source.parquet");
        let dest = dir.path().join("sub/raw.parquet");
        fs::write(&source, b"PAR1-ish").unwrap();

        let fetcher = UrlFetcher::new().unwrap();
        let bytes = fetcher.fetch(source.to_str().unwrap(), &dest).unwrap();
        assert_eq!(bytes, 8);
        assert_eq!(fs::read(&dest).unwrap(), b"PAR1-ish");

        let file_url = format!("file://{}", source.display());
        let extractor = Extractor::new(Arc::new(fetcher));
        extractor.extract(&file_url, &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"PAR1-ish");
    }

    #[test]
    fn test_extract_missing_source_is_download_error() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("raw.parquet");
        fs::write(&dest, b"stale").unwrap();

        let extractor = Extractor::new(Arc::new(UrlFetcher::new().unwrap()));
        let err = extractor
            .extract(dir.path().join("nope.parquet").to_str().unwrap(), &dest)
            .unwrap_err();

        assert_eq!(err.error_code(), "DOWNLOAD_FAILED");
        assert!(!dest.exists());
    }

    #[test]
    fn test_classify_source() {
        assert!(matches!(classify_source("https://x/y"), SourceKind::Http));
        assert!(matches!(classify_source("HTTP://x/y"), SourceKind::Http));
        assert!(matches!(
            classify_source("file:///tmp/a.parquet"),
            SourceKind::Local("/tmp/a.parquet")
        ));
        assert!(matches!(
            classify_source("data/a.parquet"),
            SourceKind::Local("data/a.parquet")
        ));
    }
}
