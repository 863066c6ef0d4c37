//! Host configuration for PrintKit
//!
//! Provides configuration file handling and validation. Supports JSON and
//! TOML file formats stored in platform-specific directories.
//!
//! Configuration is organized into logical sections:
//! - Connection settings (port, baud rate, protocol options)
//! - Progress reporting preferences
//! - Temperature polling
//! - Machine preferences (feed rate limits)

use crate::error::{Result, SettingsError};
use printkit_core::ProgressReportingMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial port name, or "Auto" to autodetect a printer port
    pub port: String,
    /// Baud rate for the serial link
    pub baud_rate: u32,
    /// Acknowledgement timeout in milliseconds
    pub timeout_ms: u64,
    /// Transmissions per line before the connection gives up
    pub ack_retries: u32,
    /// Frame outgoing lines as `N<line> <cmd>*<checksum>`
    pub use_checksums: bool,
    /// Attempt to reconnect after an unexpected link loss
    pub auto_reconnect: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: "Auto".to_string(),
            baud_rate: 115200,
            timeout_ms: 5000,
            ack_retries: 3,
            use_checksums: false,
            auto_reconnect: false,
        }
    }
}

/// Progress reporting preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressSettings {
    /// How progress lines are synthesized into the outgoing stream
    pub reporting_mode: ProgressReportingMode,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            reporting_mode: ProgressReportingMode::M73,
        }
    }
}

/// Temperature polling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureSettings {
    /// Seconds between idle M105 polls, 0 disables polling
    pub poll_interval_secs: u64,
}

impl Default for TemperatureSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
        }
    }
}

/// Machine preference settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineSettings {
    /// Default jog feed rate in mm/min
    pub jog_feed_rate: f64,
    /// Maximum feed rate the host will request in mm/min
    pub max_feed_rate: f64,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            jog_feed_rate: 3000.0,
            max_feed_rate: 6000.0,
        }
    }
}

/// Complete host configuration
///
/// Aggregates all settings sections and provides file I/O operations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HostConfig {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// Progress reporting preferences
    pub progress: ProgressSettings,
    /// Temperature polling settings
    pub temperature: TemperatureSettings,
    /// Machine preferences
    pub machine: MachineSettings,
    /// Recently printed files, most recent first
    pub recent_files: Vec<PathBuf>,
}

/// Number of entries kept in the recent files list
const RECENT_FILES_LIMIT: usize = 10;

impl HostConfig {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)?
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&content)?
        } else {
            return Err(SettingsError::UnsupportedFormat(
                path.extension()
                    .map(|ext| ext.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string()),
            ));
        };

        config.validate()?;
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        self.validate()?;

        let content = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::to_string_pretty(self)?
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            toml::to_string_pretty(self)?
        } else {
            return Err(SettingsError::UnsupportedFormat(
                path.extension()
                    .map(|ext| ext.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string()),
            ));
        };

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.connection.port.is_empty() {
            return Err(SettingsError::invalid(
                "connection.port",
                "must not be empty, use \"Auto\" for autodetection",
            ));
        }

        if self.connection.baud_rate == 0 {
            return Err(SettingsError::invalid(
                "connection.baud_rate",
                "must be > 0",
            ));
        }

        if self.connection.timeout_ms == 0 {
            return Err(SettingsError::invalid(
                "connection.timeout_ms",
                "must be > 0",
            ));
        }

        if self.connection.ack_retries == 0 {
            return Err(SettingsError::invalid(
                "connection.ack_retries",
                "must be >= 1",
            ));
        }

        if self.machine.jog_feed_rate <= 0.0 {
            return Err(SettingsError::invalid(
                "machine.jog_feed_rate",
                "must be > 0",
            ));
        }

        if self.machine.max_feed_rate <= 0.0 {
            return Err(SettingsError::invalid(
                "machine.max_feed_rate",
                "must be > 0",
            ));
        }

        if self.machine.jog_feed_rate > self.machine.max_feed_rate {
            return Err(SettingsError::invalid(
                "machine.jog_feed_rate",
                "must not exceed machine.max_feed_rate",
            ));
        }

        Ok(())
    }

    /// Add file to the recent files list
    pub fn add_recent_file(&mut self, path: PathBuf) {
        self.recent_files.retain(|f| f != &path);
        self.recent_files.insert(0, path);
        self.recent_files.truncate(RECENT_FILES_LIMIT);
    }
}
