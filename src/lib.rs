//! # PrintKit
//!
//! A Rust-based host controller that streams G-code to 3D printers over a
//! serial connection, with:
//! - Marlin-style acknowledgement flow control and resend handling
//! - A composable pull-based G-code stream pipeline
//! - Progress reporting (M73/M117), temperature tracking, pause/resume
//!
//! ## Architecture
//!
//! PrintKit is organized as a workspace with multiple crates:
//!
//! 1. **printkit-core** - Core types, state, events, print jobs
//! 2. **printkit-gcode** - Movement parsing and the stream pipeline
//! 3. **printkit-communication** - Serial transport, firmware protocol, connection
//! 4. **printkit-settings** - Host configuration and persistence
//! 5. **printkit** - Library facade and the CLI host binary

pub use printkit_core::{
    CommunicationState, ConnectionEvent, DeviceErrorEvent, DisconnectReason, Error, EventBus,
    EventCategory, EventFilter, HeaterState, JobEvent, JobOutcome, PartialMove, PauseState,
    PositionEvent, PositioningMode, PrintJob, PrinterEvent, PrinterFlags, PrinterMove,
    PrinterStatus, ProgressReportingMode, RecentEvent, Result, StateEvent, StreamEvent,
    SubscriptionId, TemperatureEvent, TemperatureSource, Temperatures, Vector3,
};

pub use printkit_gcode::{
    is_movement_line, parse_move, parse_partial, CommandInjector, FileGcodeStream, GcodeStream,
    NormalizingGcodeStream, ProgressReportStream, QueuedCommandStream, StringGcodeStream,
};

pub use printkit_communication::{
    find_printer_port, list_ports, ConnectionParams, FirmwareDialect, FirmwareResponse,
    LineTransport, MarlinDialect, PrinterConnection, SerialPortInfo, SerialTransport,
    TemperatureReport,
};

pub use printkit_settings::{HostConfig, SettingsError, SettingsManager};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Target triple the binary was built for (set at compile time)
pub const BUILD_TARGET: &str = env!("BUILD_TARGET");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Compact console output on stderr
/// - RUST_LOG environment variable support, defaulting to `info`
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}
