//! Configuration management for the CLI

use anyhow::{bail, Context, Result};
use governor_lib::store::MetricsStore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Database used when neither the flag nor the config file names one
pub const DEFAULT_DATABASE: &str = "./metrics.db";

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Metrics database path
    pub database_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        let Some(config_path) = Self::config_path() else {
            return Ok(Self::default());
        };

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Get the configuration file path
    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("fleetctl").join("config.json"))
    }
}

/// Resolve the database: flag or env var, then config file, then the default
pub fn database_path(flag: Option<PathBuf>, config: &Config) -> PathBuf {
    flag.or_else(|| config.database_path.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE))
}

/// Open an existing metrics database without writing to it
pub fn open_store(path: &Path) -> Result<MetricsStore> {
    if !path.exists() {
        bail!("metrics database {} does not exist", path.display());
    }

    MetricsStore::open_read_only(path)
        .with_context(|| format!("Failed to open metrics database {}", path.display()))
}
