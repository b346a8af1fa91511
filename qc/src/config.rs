//! querycoord configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::coordinator::CoordinatorConfig;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Settings shared by every coordinator
    pub coordinator: CoordinatorConfig,

    /// Storage provider configuration
    pub storage: StorageConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

/// Project-local config file, looked up in the working directory
pub const LOCAL_CONFIG: &str = ".querycoord.yml";

/// Configuration together with the file it was read from
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub config: Config,
    /// `None` when no file was found and defaults apply
    pub source: Option<PathBuf>,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        Self::resolve(config_path).map(|loaded| loaded.config)
    }

    /// Files tried in order when no explicit path is given: the project-local
    /// file, then `<config_dir>/querycoord/querycoord.yml`
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("querycoord").join("querycoord.yml"));
        }
        paths
    }

    /// Find and parse the effective configuration.
    ///
    /// An explicit path must load. Search-path files that exist but fail to
    /// parse are skipped with a warning.
    pub fn resolve(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
        debug!(?config_path, "Config::resolve: called");
        if let Some(path) = config_path {
            let config =
                Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()))?;
            return Ok(LoadedConfig {
                config,
                source: Some(path.clone()),
            });
        }

        for candidate in Self::search_paths().into_iter().filter(|p| p.exists()) {
            match Self::load_from_file(&candidate) {
                Ok(config) => {
                    return Ok(LoadedConfig {
                        config,
                        source: Some(candidate),
                    });
                }
                Err(e) => tracing::warn!("Skipping config {}: {:#}", candidate.display(), e),
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(LoadedConfig::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        serde_yaml::from_str(&content).context("Failed to parse config file")
    }
}

/// Storage provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Filesystem paths to report on
    pub paths: Vec<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        debug!("StorageConfig::default: called");
        Self {
            paths: vec![PathBuf::from("/")],
        }
    }
}
