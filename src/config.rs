//! Configuration Management
//!
//! Handles persistent configuration storage for resmodel.

use crate::cache::{CachePolicy, DEFAULT_MAX_ENTRIES};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Request timeout used when neither the config nor the CLI sets one
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Base URL relative resource templates are joined onto
    #[serde(default)]
    pub base_url: Option<String>,
    /// Sent as `Authorization: Bearer ...` on every request
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// Resource definitions file (.json, .yaml or .yml)
    #[serde(default)]
    pub definitions: Option<PathBuf>,
    #[serde(default)]
    pub cache_max_entries: Option<usize>,
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("resmodel").join("config.json"))
    }

    /// Load configuration from disk, falling back to defaults
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid config {:?}: {}", path, e);
                Self::default()
            }),
            Err(e) => {
                tracing::warn!("Failed to read config {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("Failed to write config {}", path.display()))?;

        Ok(())
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            max_entries: Some(self.cache_max_entries.unwrap_or(DEFAULT_MAX_ENTRIES)),
            ttl: self.cache_ttl_secs.map(Duration::from_secs),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}
