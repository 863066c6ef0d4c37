//! Transport layer
//!
//! The connection treats its link to the printer as an opaque line
//! transport: write a command line, poll for a response line, close it
//! when done. The serial implementation lives in [`serial`]; tests and
//! alternative links provide their own [`LineTransport`].

pub mod serial;

pub use serial::{find_printer_port, list_ports, SerialPortInfo, SerialTransport};

use printkit_core::Result;

/// Parameters for opening a printer link
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionParams {
    /// Port path (`/dev/ttyUSB0`, `COM3`) or `Auto` to probe for one
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Acknowledgement timeout per transmission, in milliseconds
    pub timeout_ms: u64,
    /// Transmission budget per line (the first send plus retries)
    pub ack_retries: u32,
    /// Frame outgoing lines with `N<line>` numbers and XOR checksums
    pub use_checksums: bool,
    /// Reopen the port after an unexpected link loss. The interrupted
    /// job is not resumed.
    pub auto_reconnect: bool,
    /// Seconds between idle temperature polls, 0 disables polling
    pub temperature_poll_secs: u64,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            port: "Auto".to_string(),
            baud_rate: 115_200,
            timeout_ms: 5_000,
            ack_retries: 3,
            use_checksums: false,
            auto_reconnect: false,
            temperature_poll_secs: 5,
        }
    }
}

impl ConnectionParams {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Whether the port should be resolved by probing
    pub fn is_auto_port(&self) -> bool {
        self.port.is_empty() || self.port.eq_ignore_ascii_case("auto")
    }
}

/// Byte link to a printer, framed into lines.
///
/// `read_line` polls: `Ok(None)` means nothing arrived within the
/// transport's short internal timeout and is not an error. An `Err`
/// from any method means the link is gone.
pub trait LineTransport: Send {
    /// Send one command line. The transport appends the terminator.
    fn write_line(&mut self, line: &str) -> Result<()>;

    /// Poll for one received line, trimmed, blank lines skipped
    fn read_line(&mut self) -> Result<Option<String>>;

    /// Whether the link is currently open
    fn is_open(&self) -> bool;

    /// Release the underlying device
    fn close(&mut self) -> Result<()>;

    /// Human-readable link description for logs and events
    fn description(&self) -> String;
}
