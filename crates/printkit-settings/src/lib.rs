//! PrintKit Settings Crate
//!
//! Handles host configuration and settings persistence.

pub mod config;
pub mod error;
pub mod manager;

pub use config::{
    ConnectionSettings, HostConfig, MachineSettings, ProgressSettings, TemperatureSettings,
};
pub use error::{Result, SettingsError};
pub use manager::SettingsManager;
