//! Error types for the settings crate.
//!
//! Covers config file parsing, persistence, and value validation. Parse
//! and I/O failures wrap the underlying error; validation failures carry
//! the dotted key they refer to.

use std::io;
use thiserror::Error;

/// Errors that can occur during settings operations.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// A value failed validation.
    #[error("Setting '{key}' is invalid: {reason}")]
    InvalidSetting { key: String, reason: String },

    /// The file extension maps to no known config format.
    #[error("Config format '{0}' is not supported, expected .json or .toml")]
    UnsupportedFormat(String),

    /// No usable platform config directory.
    #[error("Cannot resolve config directory: {0}")]
    ConfigDirectory(String),

    /// File read or write failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON parse or render failed.
    #[error("JSON config error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse failed.
    #[error("TOML config error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML render failed.
    #[error("Cannot render TOML: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl SettingsError {
    /// Build an `InvalidSetting` error for a dotted config key.
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
