//! Restage Configuration Module
//! Handles loading and validating restage.config.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file name inside the project directory.
pub const CONFIG_FILE: &str = "restage.config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Service configuration, constructed once at startup and passed by
/// reference into the resolver, stager, and server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub endpoints: EndpointsConfig,
}

/// The upstream repository updates are fetched from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub owner: String,
    pub name: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Staging directory, relative to the project directory.
    #[serde(default = "default_staging_dir")]
    pub dir: PathBuf,
}

/// Upstream hosting-service base URLs. Overridable so tests can point the
/// resolver and stager at a stub listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_archive_base")]
    pub archive_base: String,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8001
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from(".update")
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_archive_base() -> String {
    "https://github.com".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            dir: default_staging_dir(),
        }
    }
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            archive_base: default_archive_base(),
        }
    }
}

impl Config {
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = project_dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(ConfigError::NotFound(config_path));
        }
        let content = std::fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, project_dir: &Path) -> Result<(), ConfigError> {
        let config_path = project_dir.join(CONFIG_FILE);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn default_for_repo(owner: &str, name: &str) -> Self {
        Self {
            repository: RepositoryConfig {
                owner: owner.to_string(),
                name: name.to_string(),
                branch: default_branch(),
            },
            server: ServerConfig::default(),
            staging: StagingConfig::default(),
            endpoints: EndpointsConfig::default(),
        }
    }
}
