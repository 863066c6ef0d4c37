//! Settings manager
//!
//! Resolves the platform configuration directory and ties a [`HostConfig`]
//! to the file it was loaded from.

use crate::config::HostConfig;
use crate::error::{Result, SettingsError};
use std::path::{Path, PathBuf};

/// Directory name under the platform config dir
const CONFIG_DIR_NAME: &str = "printkit";

/// Default configuration file name
const CONFIG_FILE_NAME: &str = "config.toml";

/// Owns a configuration and the path it persists to.
#[derive(Debug, Clone)]
pub struct SettingsManager {
    path: PathBuf,
    config: HostConfig,
}

impl SettingsManager {
    /// Platform configuration directory for PrintKit.
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join(CONFIG_DIR_NAME))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no platform config directory".to_string())
            })
    }

    /// Ensure the configuration directory exists, creating it if needed.
    pub fn ensure_config_dir() -> Result<PathBuf> {
        let dir = Self::config_dir()?;
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Default configuration file path under the platform config dir.
    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Load from the default path, falling back to defaults when the file
    /// does not exist yet.
    pub fn load_or_default() -> Result<Self> {
        Self::with_path(Self::default_config_path()?)
    }

    /// Load from an explicit path, falling back to defaults when the file
    /// does not exist yet.
    pub fn with_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = if path.exists() {
            HostConfig::load_from_file(&path)?
        } else {
            HostConfig::default()
        };
        Ok(Self { path, config })
    }

    /// Path the configuration persists to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get reference to config
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Get mutable reference to config
    pub fn config_mut(&mut self) -> &mut HostConfig {
        &mut self.config
    }

    /// Save the configuration back to its path, creating parent directories
    /// as needed.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.config.save_to_file(&self.path)
    }
}
