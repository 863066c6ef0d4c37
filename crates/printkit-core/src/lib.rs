//! # PrintKit Core
//!
//! Core types, events, and data models for PrintKit.
//! Provides the fundamental abstractions shared by the G-code pipeline
//! and the printer communication layer: machine state, printer moves,
//! print jobs, the error taxonomy, and the event bus.

pub mod data;
pub mod error;
pub mod event_bus;
pub mod job;

pub use data::{
    CommunicationState, HeaterState, PartialMove, PauseState, PositioningMode, PrinterFlags,
    PrinterMove, PrinterStatus, ProgressReportingMode, Temperatures, Vector3,
};

pub use error::{Error, GcodeError, ProtocolError, Result, StateError, TransportError};

pub use job::{JobOutcome, PrintJob};

// Re-export event bus for convenience
pub use event_bus::{
    ConnectionEvent, DeviceErrorEvent, DisconnectReason, EventBus, EventBusConfig, EventCategory,
    EventFilter, JobEvent, PositionEvent, PrinterEvent, RecentEvent, StateEvent, StreamEvent,
    SubscriptionId, TemperatureEvent, TemperatureSource,
};
