//! Configuration file handling for dutflash

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use dutflash_core::{DEFAULT_BRANCH, DEFAULT_MAX_ATTEMPTS};
use dutflash_local::{DeviceCommands, DEFAULT_TOOL_PATH};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Wall-clock budget for one flash run
pub const DEFAULT_TIMEOUT_SECS: u64 = 1800;

/// Configuration for the CLI tool
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default branch to flash from
    pub branch: Option<String>,
    /// Default number of update attempts
    pub attempts: Option<u32>,
    /// Where builds are downloaded
    pub download_path: Option<PathBuf>,
    /// Directory receiving flash.log
    pub log_dir: Option<PathBuf>,
    /// Tracking handoff file
    pub tracking_file: Option<PathBuf>,
    /// Directory of per-serial command history files
    pub history_dir: Option<PathBuf>,
    /// Directory of per-device property files
    pub properties_dir: Option<PathBuf>,
    /// Root of the published build store
    pub build_store: Option<PathBuf>,
    /// Device tool location inside a build
    pub tool_path: Option<PathBuf>,
    /// Whole-run timeout in seconds
    pub timeout_secs: Option<u64>,
    /// External device tools
    pub device: Option<DeviceCommands>,
}

impl Config {
    /// Load the default config file, falling back to defaults with a warning
    /// when it cannot be read or parsed
    pub fn load_or_default() -> Self {
        match Self::config_path() {
            Ok(path) => Self::load_or_default_from(&path),
            Err(e) => {
                warn!("Using default configuration: {:#}", e);
                Self::default()
            }
        }
    }

    fn load_or_default_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        Self::load_from(path).unwrap_or_else(|e| {
            warn!("Ignoring config file: {:#}", e);
            Self::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("dutflash");

        Ok(config_dir.join("config.toml"))
    }

    /// Fill every unset value with its default below `data_dir`
    pub fn resolve(&self, data_dir: &Path) -> MergedConfig {
        let under = |value: &Option<PathBuf>, default: &str| {
            value.clone().unwrap_or_else(|| data_dir.join(default))
        };

        MergedConfig {
            branch: self
                .branch
                .clone()
                .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
            attempts: self.attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            download_path: under(&self.download_path, "downloads"),
            log_dir: under(&self.log_dir, "logs"),
            tracking_file: under(&self.tracking_file, "build_info"),
            history_dir: under(&self.history_dir, "history"),
            properties_dir: under(&self.properties_dir, "devices"),
            build_store: under(&self.build_store, "builds"),
            tool_path: self
                .tool_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TOOL_PATH)),
            timeout: Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            device: self.device.clone().unwrap_or_default(),
        }
    }
}

/// Default directory for downloads, logs and state
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("dutflash"))
        .unwrap_or_else(|| PathBuf::from(".dutflash"))
}

/// Fully resolved configuration
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub branch: String,
    pub attempts: u32,
    pub download_path: PathBuf,
    pub log_dir: PathBuf,
    pub tracking_file: PathBuf,
    pub history_dir: PathBuf,
    pub properties_dir: PathBuf,
    pub build_store: PathBuf,
    pub tool_path: PathBuf,
    pub timeout: Duration,
    pub device: DeviceCommands,
}
