//! Update Staging Module
//! Owns the staging directory: downloads the resolved archive into it,
//! records the readiness marker, and answers status/clear requests.
//!
//! The directory holds at most one staged update: `latest.zip` plus
//! `ready.json`, written in that order. The marker only ever points at a
//! fully validated archive; failed transfers live and die in a partial file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::engine::config::Config;
use crate::engine::download::{DownloadError, Downloader};
use crate::engine::resolver::{Resolver, UpdateSource};

/// Archive file name inside the staging directory.
const ARCHIVE_FILE: &str = "latest.zip";

/// Readiness marker file name inside the staging directory.
const MARKER_FILE: &str = "ready.json";

/// Extraction folder a downstream applier may leave behind. Cleaned on
/// clear, never created here.
const EXTRACT_DIR: &str = "extract";

/// Timeout for the archive transfer itself.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Anything smaller than this is an error page, not an archive.
const MIN_ARCHIVE_BYTES: u64 = 1000;

#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error("Download failed: file too small or empty ({0} bytes)")]
    TooSmall(u64),
    #[error("Filesystem error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to write readiness marker: {0}")]
    Marker(#[from] serde_json::Error),
}

/// Readiness marker persisted next to the archive. Exists iff a staged
/// update is complete and valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyMarker {
    /// Archive file modification time.
    pub downloaded_at: DateTime<Utc>,
    pub source: UpdateSource,
    pub url: String,
}

/// Stages updates for the host application to apply on its next restart.
pub struct Stager {
    staging_dir: PathBuf,
    resolver: Resolver,
    downloader: Downloader,
}

impl Stager {
    pub fn new(config: Arc<Config>, project_dir: &Path) -> Self {
        let staging_dir = project_dir.join(&config.staging.dir);
        Self {
            staging_dir,
            resolver: Resolver::new(config),
            downloader: Downloader::new(),
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn archive_path(&self) -> PathBuf {
        self.staging_dir.join(ARCHIVE_FILE)
    }

    pub fn marker_path(&self) -> PathBuf {
        self.staging_dir.join(MARKER_FILE)
    }

    pub fn extract_dir(&self) -> PathBuf {
        self.staging_dir.join(EXTRACT_DIR)
    }

    /// Download the latest update into the staging directory and mark it
    /// ready.
    ///
    /// The transfer streams into a partial file; the archive is only
    /// replaced, and the marker only written, after the size check passes.
    /// A failed attempt therefore leaves any previously staged update
    /// intact and still valid.
    pub async fn stage(&self) -> Result<String, StageError> {
        fs::create_dir_all(&self.staging_dir)?;

        let (url, source) = self.resolver.resolve().await;
        tracing::info!(%url, ?source, "downloading update");

        let archive_path = self.archive_path();
        let mut last_logged: u64 = 0;
        let outcome = self
            .downloader
            .download(&url, &archive_path, DOWNLOAD_TIMEOUT, |downloaded, total| {
                if total > 0 {
                    let percent = downloaded * 100 / total;
                    if percent >= last_logged + 10 {
                        last_logged = percent - percent % 10;
                        tracing::debug!(percent, downloaded, total, "download progress");
                    }
                }
            })
            .await;

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                let _ = fs::remove_file(archive_path.with_extension("partial"));
                return Err(e.into());
            }
        };

        let size = fs::metadata(&result.partial_path).map(|m| m.len()).unwrap_or(0);
        if size < MIN_ARCHIVE_BYTES {
            let _ = fs::remove_file(&result.partial_path);
            return Err(StageError::TooSmall(size));
        }

        fs::rename(&result.partial_path, &archive_path)?;
        self.write_marker(source, &url)?;

        tracing::info!(bytes = result.bytes_downloaded, "update staged");
        Ok("Downloaded. Restart to apply.".to_string())
    }

    /// True iff both the archive and the readiness marker exist.
    pub fn is_ready(&self) -> bool {
        self.marker_path().exists() && self.archive_path().exists()
    }

    /// Read the readiness marker, if one exists.
    pub fn read_marker(&self) -> Result<Option<ReadyMarker>, StageError> {
        let path = self.marker_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Remove staged update files. Each artifact is deleted independently
    /// and tolerates already being absent.
    pub fn clear(&self) -> Result<String, StageError> {
        let marker = self.marker_path();
        if marker.exists() {
            fs::remove_file(&marker)?;
        }

        let archive = self.archive_path();
        if archive.exists() {
            fs::remove_file(&archive)?;
        }

        let extract = self.extract_dir();
        if extract.exists() {
            fs::remove_dir_all(&extract)?;
        }

        Ok("Update files cleared".to_string())
    }

    fn write_marker(&self, source: UpdateSource, url: &str) -> Result<(), StageError> {
        let downloaded_at: DateTime<Utc> = fs::metadata(self.archive_path())?.modified()?.into();
        let marker = ReadyMarker {
            downloaded_at,
            source,
            url: url.to_string(),
        };
        let content = serde_json::to_string_pretty(&marker)?;

        // Write to temp file first, then rename (atomic)
        let temp_path = self.marker_path().with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, self.marker_path())?;
        Ok(())
    }
}
