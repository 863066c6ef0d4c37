//! Firmware protocol handling
//!
//! Marlin-style firmwares speak a plain-text line protocol: the host
//! sends one command per line and waits for an acknowledgement before
//! sending the next. What counts as an acknowledgement, how numbered
//! lines are framed, and how temperature reports are shaped all live
//! behind the [`FirmwareDialect`] trait.

pub mod marlin;

pub use marlin::MarlinDialect;

use printkit_core::Temperatures;
use serde::{Deserialize, Serialize};

/// One classified line from the printer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FirmwareResponse {
    /// Acknowledgement, optionally carrying a temperature report
    Ok {
        /// Temperatures appended to the ok, if any
        temperatures: Option<TemperatureReport>,
    },
    /// Request to retransmit a numbered line
    Resend {
        /// The line number the firmware expects next
        line_number: u32,
    },
    /// Firmware error report
    Error {
        /// The message after the error prefix
        message: String,
    },
    /// Firmware is busy; the outstanding command needs more time
    Busy {
        /// Detail after the busy prefix ("processing", "paused for user")
        detail: String,
    },
    /// Unsolicited temperature report
    Temperature(TemperatureReport),
    /// Firmware boot banner
    Start,
    /// Informational chatter (echo lines, capability reports)
    Info {
        /// The raw informational line
        message: String,
    },
    /// A line the dialect could not classify
    Unrecognized {
        /// The raw line
        line: String,
    },
}

/// Heater readings parsed from a report like `T:201.3 /210.0 B:58.1 /60.0`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureReport {
    /// Hotend temperature in degrees C
    pub hotend_current: f64,
    /// Hotend target, when the report includes one
    pub hotend_target: Option<f64>,
    /// Bed temperature, when the report includes one
    pub bed_current: Option<f64>,
    /// Bed target, when the report includes one
    pub bed_target: Option<f64>,
}

impl TemperatureReport {
    /// Fold this report into a [`Temperatures`] snapshot.
    ///
    /// Fields the report omits keep their previous values.
    pub fn apply_to(&self, temperatures: &mut Temperatures) {
        temperatures.hotend.current = self.hotend_current;
        if let Some(target) = self.hotend_target {
            temperatures.hotend.target = target;
        }
        if let Some(current) = self.bed_current {
            temperatures.bed.current = current;
        }
        if let Some(target) = self.bed_target {
            temperatures.bed.target = target;
        }
    }
}

/// Protocol personality of a printer firmware
pub trait FirmwareDialect: Send + Sync {
    /// Dialect name for logs
    fn name(&self) -> &str;

    /// Classify one received line
    fn parse_response(&self, line: &str) -> FirmwareResponse;

    /// Frame `command` as numbered line `line_number` with a checksum
    fn frame_line(&self, line_number: u32, command: &str) -> String;

    /// Command that resets the firmware's expected line number
    fn line_number_reset(&self) -> &str;

    /// Command that queries the current temperatures
    fn temperature_query(&self) -> &str;
}
