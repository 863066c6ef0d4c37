//! Error handling for PrintKit
//!
//! Provides error types for all layers of the host:
//! - Transport errors (serial port / connection loss)
//! - Protocol errors (firmware response handling)
//! - State errors (connection state machine misuse)
//! - G-Code errors (input file handling)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Transport error type
///
/// Represents failures of the serial link itself: opening, reading,
/// writing, and acknowledgement timeouts. Transport errors force the
/// connection back to `Disconnected`.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Port not found
    #[error("Port not found: {port}")]
    PortNotFound {
        /// The name of the port that was not found.
        port: String,
    },

    /// Port is already in use
    #[error("Port already in use: {port}")]
    PortInUse {
        /// The name of the port that is in use.
        port: String,
    },

    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Transport is not open
    #[error("Transport not open")]
    NotOpen,

    /// Write to the device failed
    #[error("Write failed: {reason}")]
    WriteFailed {
        /// The reason the write failed.
        reason: String,
    },

    /// Read from the device failed
    #[error("Read failed: {reason}")]
    ReadFailed {
        /// The reason the read failed.
        reason: String,
    },

    /// No acknowledgement within the timeout, retry budget exhausted
    #[error("No acknowledgement after {attempts} attempts ({timeout_ms}ms each)")]
    AckTimeout {
        /// Number of send attempts made for the line.
        attempts: u32,
        /// The per-attempt timeout in milliseconds.
        timeout_ms: u64,
    },

    /// Connection lost
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Baud rate not supported
    #[error("Baud rate {baud} not supported")]
    UnsupportedBaudRate {
        /// The unsupported baud rate.
        baud: u32,
    },

    /// I/O error
    #[error("I/O error: {reason}")]
    IoError {
        /// The reason for the I/O error.
        reason: String,
    },

    /// Generic transport error
    #[error("Transport error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}

/// Protocol error type
///
/// Represents firmware lines the host could not make sense of. Protocol
/// errors are reported to observers but never tear down the connection
/// on their own.
#[derive(Error, Debug, Clone)]
pub enum ProtocolError {
    /// Response line could not be parsed
    #[error("Malformed response: {line}")]
    MalformedResponse {
        /// The raw response line.
        line: String,
    },

    /// Response valid but unexpected in the current exchange
    #[error("Unexpected response: {line}")]
    UnexpectedResponse {
        /// The raw response line.
        line: String,
    },

    /// Firmware reported a command error
    #[error("Device error: {message}")]
    DeviceError {
        /// The error message reported by the firmware.
        message: String,
    },

    /// Firmware requested a resend for a line the host no longer tracks
    #[error("Resend requested for unknown line {line_number}")]
    ResendOutOfRange {
        /// The line number the firmware asked for.
        line_number: u32,
    },

    /// Generic protocol error
    #[error("Protocol error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}

/// State error type
///
/// Represents logical misuse of the connection API: operations requested
/// in a state that cannot accept them. Rejected synchronously with no
/// state change.
#[derive(Error, Debug, Clone)]
pub enum StateError {
    /// Connection is not established
    #[error("Printer not connected")]
    NotConnected,

    /// Connection is already established
    #[error("Printer already connected")]
    AlreadyConnected,

    /// A print is already running
    #[error("Print already in progress")]
    PrintInProgress,

    /// No print job is active
    #[error("No active print job")]
    NoActiveJob,

    /// Invalid state transition
    #[error("Invalid state transition from {current:?} to {requested:?}")]
    InvalidTransition {
        /// The current state name.
        current: String,
        /// The requested state name.
        requested: String,
    },

    /// Generic state error
    #[error("State error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}

/// G-Code error type
///
/// Represents errors handling G-code input. Movement parsing is fail-soft
/// and never produces these; they come from loading and validating input.
#[derive(Error, Debug, Clone)]
pub enum GcodeError {
    /// Input file could not be read
    #[error("File error: {reason}")]
    FileError {
        /// The reason for the file error.
        reason: String,
    },

    /// Input contained no sendable lines
    #[error("Empty G-code input")]
    EmptyInput,

    /// Generic G-Code error
    #[error("G-Code error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}

/// Main error type for PrintKit
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// State error
    #[error(transparent)]
    State(#[from] StateError),

    /// G-Code error
    #[error(transparent)]
    Gcode(#[from] GcodeError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is an acknowledgement timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Transport(TransportError::AckTimeout { .. }))
    }

    /// Check if this is a transport error
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Check if this is a protocol error
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }

    /// Check if this is a state error
    pub fn is_state_error(&self) -> bool {
        matches!(self, Error::State(_))
    }

    /// Check if this is a G-Code error
    pub fn is_gcode_error(&self) -> bool {
        matches!(self, Error::Gcode(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

// Conversions between error types are automatic via `from` implementations
