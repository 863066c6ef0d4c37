//! Event type definitions for the event bus.
//!
//! This module defines the printer events organized by category.
//! Events are designed to be cloneable and serializable for logging/replay.

use serde::{Deserialize, Serialize};

use crate::data::{CommunicationState, PrinterMove, Temperatures};

/// Root event enum for all printer events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PrinterEvent {
    /// Connection lifecycle events
    Connection(ConnectionEvent),
    /// Communication state transitions
    State(StateEvent),
    /// Print job lifecycle and progress
    Job(JobEvent),
    /// Line-level traffic on the transport
    Stream(StreamEvent),
    /// Machine position changes
    Position(PositionEvent),
    /// Temperature reports and target changes
    Temperature(TemperatureEvent),
    /// Device errors and diagnostics
    Error(DeviceErrorEvent),
}

impl PrinterEvent {
    /// Get the category of this event
    pub fn category(&self) -> EventCategory {
        match self {
            PrinterEvent::Connection(_) => EventCategory::Connection,
            PrinterEvent::State(_) => EventCategory::State,
            PrinterEvent::Job(_) => EventCategory::Job,
            PrinterEvent::Stream(_) => EventCategory::Stream,
            PrinterEvent::Position(_) => EventCategory::Position,
            PrinterEvent::Temperature(_) => EventCategory::Temperature,
            PrinterEvent::Error(_) => EventCategory::Error,
        }
    }

    /// Get a short description of this event for logging
    pub fn description(&self) -> String {
        match self {
            PrinterEvent::Connection(e) => e.description(),
            PrinterEvent::State(e) => e.description(),
            PrinterEvent::Job(e) => e.description(),
            PrinterEvent::Stream(e) => e.description(),
            PrinterEvent::Position(e) => e.description(),
            PrinterEvent::Temperature(e) => e.description(),
            PrinterEvent::Error(e) => e.description(),
        }
    }
}

/// Event category for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Connection lifecycle events.
    Connection,
    /// Communication state transitions.
    State,
    /// Print job lifecycle and progress events.
    Job,
    /// Line-level traffic events.
    Stream,
    /// Machine position events.
    Position,
    /// Temperature events.
    Temperature,
    /// Device error and diagnostic events.
    Error,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventCategory::Connection => write!(f, "Connection"),
            EventCategory::State => write!(f, "State"),
            EventCategory::Job => write!(f, "Job"),
            EventCategory::Stream => write!(f, "Stream"),
            EventCategory::Position => write!(f, "Position"),
            EventCategory::Temperature => write!(f, "Temperature"),
            EventCategory::Error => write!(f, "Error"),
        }
    }
}

/// Reason for disconnection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// User requested disconnect
    UserRequested,
    /// Connection lost unexpectedly
    ConnectionLost,
    /// Acknowledgement retry budget exhausted
    AckTimeout,
    /// Error occurred
    Error(String),
}

/// Connection lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConnectionEvent {
    /// Starting connection attempt.
    Connecting {
        /// Serial port path being connected to.
        port: String,
    },
    /// Successfully connected.
    Connected {
        /// Serial port path that was connected.
        port: String,
    },
    /// Disconnected from device.
    Disconnected {
        /// Serial port path that was disconnected.
        port: String,
        /// Reason for the disconnection.
        reason: DisconnectReason,
    },
    /// Connection attempt failed.
    ConnectionFailed {
        /// Serial port path that failed to connect.
        port: String,
        /// Error message describing the failure.
        error: String,
    },
}

impl ConnectionEvent {
    fn description(&self) -> String {
        match self {
            ConnectionEvent::Connecting { port } => format!("Connecting to {}", port),
            ConnectionEvent::Connected { port } => format!("Connected to {}", port),
            ConnectionEvent::Disconnected { port, reason } => {
                format!("Disconnected from {}: {:?}", port, reason)
            }
            ConnectionEvent::ConnectionFailed { port, error } => {
                format!("Connection failed to {}: {}", port, error)
            }
        }
    }
}

/// Communication state transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StateEvent {
    /// The connection moved to a new state.
    Changed {
        /// Previous communication state.
        old: CommunicationState,
        /// New communication state.
        new: CommunicationState,
    },
}

impl StateEvent {
    fn description(&self) -> String {
        match self {
            StateEvent::Changed { old, new } => format!("State {} -> {}", old, new),
        }
    }
}

/// Print job lifecycle and progress events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
    /// A print job started.
    Started {
        /// Job description, usually the file name.
        description: String,
        /// Total lines in the source stream.
        total_lines: usize,
    },
    /// Percent-complete advanced.
    ProgressChanged {
        /// New percent complete, 0..=100.
        percent: f64,
    },
    /// The job ran to completion.
    Finished {
        /// Wall-clock seconds the print took.
        seconds_printed: f64,
    },
    /// The job was canceled.
    Canceled {
        /// Percent complete at cancellation.
        percent: f64,
    },
    /// The job failed.
    Failed {
        /// Human-readable failure reason.
        reason: String,
    },
    /// The job was paused.
    Paused,
    /// The job resumed after a pause.
    Resumed,
}

impl JobEvent {
    fn description(&self) -> String {
        match self {
            JobEvent::Started {
                description,
                total_lines,
            } => format!("Print started: {} ({} lines)", description, total_lines),
            JobEvent::ProgressChanged { percent } => format!("Progress {:.1}%", percent),
            JobEvent::Finished { seconds_printed } => {
                format!("Print finished in {:.0}s", seconds_printed)
            }
            JobEvent::Canceled { percent } => format!("Print canceled at {:.1}%", percent),
            JobEvent::Failed { reason } => format!("Print failed: {}", reason),
            JobEvent::Paused => "Print paused".to_string(),
            JobEvent::Resumed => "Print resumed".to_string(),
        }
    }
}

/// Line-level traffic events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StreamEvent {
    /// A line was written to the transport.
    LineSent {
        /// The line as transmitted (without terminator).
        line: String,
    },
    /// A line was received from the device.
    LineReceived {
        /// The raw received line.
        line: String,
    },
    /// A line is being retransmitted after a missed acknowledgement.
    LineRetried {
        /// The line being retried.
        line: String,
        /// Attempt number, starting at 2 for the first retry.
        attempt: u32,
    },
}

impl StreamEvent {
    fn description(&self) -> String {
        match self {
            StreamEvent::LineSent { line } => format!("> {}", line),
            StreamEvent::LineReceived { line } => format!("< {}", line),
            StreamEvent::LineRetried { line, attempt } => {
                format!("retry #{}: {}", attempt, line)
            }
        }
    }
}

/// Machine position events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PositionEvent {
    /// The destination of the most recent movement line changed.
    DestinationChanged {
        /// New last-known machine state.
        position: PrinterMove,
    },
}

impl PositionEvent {
    fn description(&self) -> String {
        match self {
            PositionEvent::DestinationChanged { position } => {
                format!("Destination {}", position)
            }
        }
    }
}

/// Where a temperature snapshot came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum TemperatureSource {
    /// Parsed from a firmware report (M105 reply or autoreport)
    Report,
    /// Targets updated because the host transmitted a heater command
    HostCommand,
}

/// Temperature events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TemperatureEvent {
    /// Temperatures changed.
    Updated {
        /// The new temperature snapshot.
        temperatures: Temperatures,
        /// Where the snapshot came from.
        source: TemperatureSource,
    },
}

impl TemperatureEvent {
    fn description(&self) -> String {
        match self {
            TemperatureEvent::Updated { temperatures, .. } => {
                format!("Temperatures {}", temperatures)
            }
        }
    }
}

/// Device error and diagnostic events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeviceErrorEvent {
    /// The firmware reported an error for a command.
    Reported {
        /// The error message from the device.
        message: String,
    },
    /// A received line could not be interpreted.
    Malformed {
        /// The raw line.
        line: String,
    },
}

impl DeviceErrorEvent {
    fn description(&self) -> String {
        match self {
            DeviceErrorEvent::Reported { message } => format!("Device error: {}", message),
            DeviceErrorEvent::Malformed { line } => format!("Unrecognized response: {}", line),
        }
    }
}
