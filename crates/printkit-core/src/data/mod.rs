//! Core data models for PrintKit
//!
//! Provides the fundamental data structures used throughout PrintKit:
//! machine positions, printer moves, communication states, positioning
//! modes, and temperature snapshots.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position in 3D space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    /// X-axis position
    pub x: f64,
    /// Y-axis position
    pub y: f64,
    /// Z-axis position
    pub z: f64,
}

impl Vector3 {
    /// Create a new position with X, Y, Z coordinates
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The origin (0, 0, 0)
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Add another vector (component-wise)
    pub fn add(&self, other: &Vector3) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }

    /// Subtract another vector (component-wise)
    pub fn subtract(&self, other: &Vector3) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }

    /// Calculate distance to another position
    pub fn distance_to(&self, other: &Vector3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl Default for Vector3 {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X:{:.2} Y:{:.2} Z:{:.2}", self.x, self.y, self.z)
    }
}

/// Snapshot of machine position and extrusion state at a point in the
/// line stream.
///
/// A `PrinterMove` is never mutated after creation. "Updating position"
/// means constructing a new `PrinterMove` (usually via
/// [`PartialMove::apply_to`]) and replacing the reference to the last
/// known position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrinterMove {
    /// Machine position after the move
    pub position: Vector3,
    /// Extruder filament position (E axis) after the move
    pub extruder_position: f64,
    /// Feed rate in effect, in mm/min
    pub feed_rate: f64,
}

impl PrinterMove {
    /// Create a move at the given position with extruder and feed state
    pub fn new(position: Vector3, extruder_position: f64, feed_rate: f64) -> Self {
        Self {
            position,
            extruder_position,
            feed_rate,
        }
    }

    /// Create a move at a position, keeping extruder and feed at zero
    pub fn at(position: Vector3) -> Self {
        Self {
            position,
            extruder_position: 0.0,
            feed_rate: 0.0,
        }
    }

    /// Copy of this move relocated to `position`
    pub fn with_position(&self, position: Vector3) -> Self {
        Self { position, ..*self }
    }
}

impl Default for PrinterMove {
    fn default() -> Self {
        Self::new(Vector3::zero(), 0.0, 0.0)
    }
}

impl fmt::Display for PrinterMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} E:{:.3} F:{:.0}",
            self.position, self.extruder_position, self.feed_rate
        )
    }
}

/// Partially specified move for updating only the axes a line mentions
///
/// Each field is an `Option` where `None` means "this word was absent" and
/// `Some(value)` means the line carried that axis word. Produced by the
/// movement parser and folded into a prior [`PrinterMove`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialMove {
    /// X-axis word, if present
    pub x: Option<f64>,
    /// Y-axis word, if present
    pub y: Option<f64>,
    /// Z-axis word, if present
    pub z: Option<f64>,
    /// Extruder (E) word, if present
    pub e: Option<f64>,
    /// Feed rate (F) word, if present
    pub f: Option<f64>,
}

impl PartialMove {
    /// Create a new empty partial move (all words absent)
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if no words are present
    pub fn is_empty(&self) -> bool {
        self.x.is_none()
            && self.y.is_none()
            && self.z.is_none()
            && self.e.is_none()
            && self.f.is_none()
    }

    /// Fold this partial move into an existing move, producing the new
    /// machine state.
    ///
    /// Unspecified axes keep `prev`'s values. In `Relative` mode the
    /// specified axis and extruder words are offsets added to `prev`;
    /// feed rate is always absolute.
    pub fn apply_to(&self, prev: &PrinterMove, mode: PositioningMode) -> PrinterMove {
        let position = match mode {
            PositioningMode::Absolute => Vector3 {
                x: self.x.unwrap_or(prev.position.x),
                y: self.y.unwrap_or(prev.position.y),
                z: self.z.unwrap_or(prev.position.z),
            },
            PositioningMode::Relative => Vector3 {
                x: prev.position.x + self.x.unwrap_or(0.0),
                y: prev.position.y + self.y.unwrap_or(0.0),
                z: prev.position.z + self.z.unwrap_or(0.0),
            },
        };
        let extruder_position = match mode {
            PositioningMode::Absolute => self.e.unwrap_or(prev.extruder_position),
            PositioningMode::Relative => prev.extruder_position + self.e.unwrap_or(0.0),
        };
        PrinterMove {
            position,
            extruder_position,
            feed_rate: self.f.unwrap_or(prev.feed_rate),
        }
    }
}

/// Positioning mode for movement interpretation
///
/// External context for the movement parser: set by `G90`/`G91` and
/// tracked by the connection, never by the parser itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PositioningMode {
    /// Absolute coordinates (G90)
    #[default]
    Absolute,
    /// Relative offsets (G91)
    Relative,
}

impl fmt::Display for PositioningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute => write!(f, "Absolute"),
            Self::Relative => write!(f, "Relative"),
        }
    }
}

/// Printer connection state machine states
///
/// Exactly one value is active at a time and transitions happen only
/// through the connection; external code never assigns state directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommunicationState {
    /// Not connected to any printer
    Disconnected,
    /// Attempting to open the transport
    Connecting,
    /// Connected and idle, ready for commands
    Connected,
    /// Streaming a print job
    Printing,
    /// Print paused, awaiting resume
    Paused,
    /// Print ran to completion
    Finished,
    /// Print was canceled by the user
    Canceled,
}

impl CommunicationState {
    /// Check if this state indicates an open transport
    pub fn is_connected(&self) -> bool {
        !matches!(
            self,
            CommunicationState::Disconnected | CommunicationState::Connecting
        )
    }

    /// Check if a print job is active (running or paused)
    pub fn is_printing(&self) -> bool {
        matches!(
            self,
            CommunicationState::Printing | CommunicationState::Paused
        )
    }

    /// Check if the connection will accept manual commands
    pub fn accepts_commands(&self) -> bool {
        matches!(
            self,
            CommunicationState::Connected
                | CommunicationState::Printing
                | CommunicationState::Paused
        )
    }

    /// Check if a transition from this state to `target` is valid.
    ///
    /// Returns `true` for valid transitions:
    /// - Disconnected can only go to Connecting
    /// - Connecting can go to Connected or back to Disconnected
    /// - Printing and Paused alternate; both can end in Finished or Canceled
    /// - Any connected state can go to Disconnected (connection loss)
    pub fn can_transition_to(&self, target: CommunicationState) -> bool {
        use CommunicationState::*;
        if *self == target {
            return true;
        }
        match (self, target) {
            // Connection lifecycle
            (Disconnected, Connecting) => true,
            (Connecting, Connected | Disconnected) => true,
            // Any connected state can disconnect
            (_, Disconnected) => true,
            // Cannot skip the connection handshake
            (Disconnected | Connecting, _) => false,
            // Idle can start printing
            (Connected, Printing) => true,
            (Connected, _) => false,
            // Printing can pause, finish, or be canceled
            (Printing, Paused | Finished | Canceled) => true,
            // Paused can resume, finish, or be canceled
            (Paused, Printing | Finished | Canceled) => true,
            // Terminal print states return to idle before anything else
            (Finished | Canceled, Connected) => true,
            _ => false,
        }
    }
}

impl Default for CommunicationState {
    fn default() -> Self {
        Self::Disconnected
    }
}

impl fmt::Display for CommunicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Printing => write!(f, "Printing"),
            Self::Paused => write!(f, "Paused"),
            Self::Finished => write!(f, "Finished"),
            Self::Canceled => write!(f, "Canceled"),
        }
    }
}

/// Fine-grained pause progression
///
/// `PauseRequested` covers the window between the user's request and the
/// worker acknowledging it at the next between-lines checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PauseState {
    /// Not paused
    #[default]
    NotPaused,
    /// Pause requested, worker has not yet reached a line boundary
    PauseRequested,
    /// Worker has stalled the read loop
    Paused,
}

/// Orthogonal printer flags tracked alongside the communication state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterFlags {
    /// ATX power supply is switched on (M80 seen, M81 clears)
    pub atx_power_enabled: bool,
    /// The active job is a calibration print
    pub calibration_print: bool,
}

/// Current and target temperature of one heater
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeaterState {
    /// Last reported temperature in degrees C
    pub current: f64,
    /// Target temperature in degrees C (0 when off)
    pub target: f64,
}

/// Snapshot of the printer's reported temperatures
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Temperatures {
    /// Hotend heater
    pub hotend: HeaterState,
    /// Heated bed
    pub bed: HeaterState,
}

impl fmt::Display for Temperatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "T:{:.1}/{:.1} B:{:.1}/{:.1}",
            self.hotend.current, self.hotend.target, self.bed.current, self.bed.target
        )
    }
}

/// Progress reporting mode for the annotation stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressReportingMode {
    /// No progress lines are synthesized
    #[default]
    None,
    /// Emit `M73 P<percent>` lines
    M73,
    /// Emit `M117 <percent>% complete` display messages
    M117,
}

impl fmt::Display for ProgressReportingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::M73 => write!(f, "M73"),
            Self::M117 => write!(f, "M117"),
        }
    }
}

/// Point-in-time view of a connection, for status displays
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrinterStatus {
    /// Communication state at snapshot time
    pub state: CommunicationState,
    /// Fine-grained pause progression
    pub pause: PauseState,
    /// Orthogonal flags
    pub flags: PrinterFlags,
    /// Last known machine position
    pub position: PrinterMove,
    /// Last reported temperatures
    pub temperatures: Temperatures,
    /// Percent complete of the active job, 0 when idle
    pub percent_complete: f64,
}
