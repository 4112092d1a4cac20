//! Release Resolution Module
//! Picks the download URL for the latest update: a tagged release asset when
//! one exists, the release zipball otherwise, or the branch archive as the
//! unconditional fallback.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::engine::config::Config;
use crate::engine::USER_AGENT;

/// Archive extension a release asset must carry to be selected.
const ARCHIVE_EXT: &str = ".zip";

/// Timeout for the release-listing query.
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum ResolveError {
    /// The repository has no published releases. Expected, not a failure.
    #[error("no published releases")]
    NoReleases,
    #[error("API error: {0}")]
    ApiError(String),
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Where a resolved URL points: a tagged release or an auto-generated
/// branch archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateSource {
    Release,
    Archive,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

/// Latest-release document from the release-listing endpoint. The schema is
/// the hosting service's, fixed, not ours.
#[derive(Debug, Deserialize)]
pub struct LatestRelease {
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
    pub zipball_url: Option<String>,
}

/// Resolves the download URL for the latest update of the configured
/// repository.
pub struct Resolver {
    config: Arc<Config>,
    http_client: reqwest::Client,
}

impl Resolver {
    pub fn new(config: Arc<Config>) -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            config,
            http_client,
        }
    }

    /// Resolve the download URL for the latest update.
    ///
    /// Never fails: when the release lookup finds nothing (or errors), the
    /// branch-archive URL is returned. Only the lookup itself goes over the
    /// network; the fallback is constructed locally.
    pub async fn resolve(&self) -> (String, UpdateSource) {
        match self.latest_release().await {
            Ok(release) => {
                if let Some(asset) = release
                    .assets
                    .iter()
                    .find(|a| a.name.ends_with(ARCHIVE_EXT))
                {
                    return (asset.browser_download_url.clone(), UpdateSource::Release);
                }
                if let Some(zipball) = release.zipball_url {
                    return (zipball, UpdateSource::Release);
                }
            }
            Err(ResolveError::NoReleases) => {}
            Err(e) => {
                tracing::warn!(error = %e, "release lookup failed, falling back to branch archive");
            }
        }

        (self.branch_archive_url(), UpdateSource::Archive)
    }

    /// Query the release-listing endpoint for the latest release.
    async fn latest_release(&self) -> Result<LatestRelease, ResolveError> {
        let repo = &self.config.repository;
        let url = format!(
            "{}/repos/{}/{}/releases/latest",
            self.config.endpoints.api_base, repo.owner, repo.name
        );

        let response = self
            .http_client
            .get(&url)
            .timeout(RESOLVE_TIMEOUT)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ResolveError::NoReleases);
        }

        if !response.status().is_success() {
            return Err(ResolveError::ApiError(format!(
                "Failed to query releases: {}",
                response.status()
            )));
        }

        let release: LatestRelease = response.json().await?;
        Ok(release)
    }

    fn branch_archive_url(&self) -> String {
        let repo = &self.config.repository;
        format!(
            "{}/{}/{}/archive/refs/heads/{}.zip",
            self.config.endpoints.archive_base, repo.owner, repo.name, repo.branch
        )
    }
}
