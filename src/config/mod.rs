//! Configuration module for plotembed-rs
//!
//! This module handles persisted configuration:
//! - The launch profile (which tool, setup command, initial commands)
//! - Worker timing (attachment timeout, exit polling)
//!
//! # App Data Location
//!
//! Configuration is stored in the platform-appropriate location:
//! - **Linux**: `~/.local/share/dev.hxyulin.plotembed-rs/`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.plotembed-rs/`
//! - **Windows**: `%APPDATA%\dev.hxyulin.plotembed-rs\`
//!
//! # Files
//!
//! - `config.json` - The [`AppConfig`]
//! - Launch profiles (`.toml`) - Saved wherever the user chooses, loaded with
//!   [`LaunchProfile::from_toml_file`]

pub mod settings;

pub use settings::*;

use crate::error::{EmbedError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for data directories
pub const APP_ID: &str = "dev.hxyulin.plotembed-rs";

/// Config filename
pub const CONFIG_FILE: &str = "config.json";

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        EmbedError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            EmbedError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

/// Get the path to the config file
pub fn config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== App Config ====================

/// Complete configuration of the embedding controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version for future migration support
    #[serde(default = "default_config_version")]
    pub version: u32,

    /// Foreign tool to launch
    #[serde(default)]
    pub launch: LaunchProfile,

    /// Background thread timing
    #[serde(default)]
    pub worker: WorkerConfig,
}

fn default_config_version() -> u32 {
    1
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: 1,
            launch: LaunchProfile::default(),
            worker: WorkerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Config with a specific launch profile and default timing
    pub fn with_profile(launch: LaunchProfile) -> Self {
        Self {
            launch,
            ..Self::default()
        }
    }

    /// Load config from the default location
    ///
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        let path = config_path().ok_or_else(|| {
            EmbedError::Config("Could not determine config path".to_string())
        })?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load config, returning defaults on any error
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Load config from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| EmbedError::Config(format!("Failed to read config: {}", e)))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| EmbedError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        let dir = ensure_app_data_dir()?;
        self.save_to(dir.join(CONFIG_FILE))
    }

    /// Save config to a specific file
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| EmbedError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| EmbedError::Config(format!("Failed to write config: {}", e)))
    }

    /// Check the config is usable
    pub fn validate(&self) -> Result<()> {
        self.launch.validate()?;
        self.worker.validate()
    }
}
