//! HTTP Download Module
//! Streams a large archive to disk in chunks, writing to a partial file the
//! caller promotes once it has validated the result.

use reqwest::StatusCode;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::engine::USER_AGENT;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid response: HTTP {0}")]
    InvalidResponse(StatusCode),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

/// Download result with metadata.
#[derive(Debug)]
pub struct DownloadResult {
    /// The partial file holding the downloaded bytes. Not the final
    /// destination: the caller renames it into place after validation.
    pub partial_path: PathBuf,
    pub bytes_downloaded: u64,
}

/// Download manager for update archives.
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Stream `url` into `<dest>.partial`, reporting progress through the
    /// callback as `(bytes_downloaded, total_bytes)`; total is 0 when the
    /// response carries no content length.
    ///
    /// The destination file itself is never touched, so a failed or
    /// interrupted transfer cannot clobber a previously downloaded archive.
    pub async fn download<F>(
        &self,
        url: &str,
        dest: &Path,
        timeout: Duration,
        mut on_progress: F,
    ) -> Result<DownloadResult, DownloadError>
    where
        F: FnMut(u64, u64),
    {
        let partial_path = dest.with_extension("partial");
        if let Some(parent) = partial_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DownloadError::InvalidResponse(response.status()));
        }

        let total_size = response.content_length().unwrap_or(0);
        let mut file = File::create(&partial_path)?;
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        use futures_util::StreamExt;
        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| DownloadError::Network(e.to_string()))?;
            file.write_all(&chunk)?;
            downloaded += chunk.len() as u64;
            on_progress(downloaded, total_size);
        }

        file.flush()?;
        drop(file);

        Ok(DownloadResult {
            partial_path,
            bytes_downloaded: downloaded,
        })
    }
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new()
    }
}
