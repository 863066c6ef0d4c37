//! Streaming pipeline
//!
//! A print is driven by pulling lines from a chain of [`GcodeStream`]
//! stages, each wrapping the one below it and adding a single concern:
//!
//! ```text
//! FileGcodeStream -> NormalizingGcodeStream -> QueuedCommandStream -> ProgressReportStream
//! ```
//!
//! The connection pulls from the head of the chain and writes each line
//! to the printer. Position knowledge flows the other way: stages push
//! the last commanded destination downward through
//! [`GcodeStream::set_printer_position`] so every stage agrees on where
//! the printer is headed.

mod normalize;
mod progress;
mod queued;
mod source;

pub use normalize::NormalizingGcodeStream;
pub use progress::ProgressReportStream;
pub use queued::{CommandInjector, QueuedCommandStream};
pub use source::{FileGcodeStream, StreamProgress, StringGcodeStream};

use parking_lot::RwLock;
use printkit_core::{
    CommunicationState, PositioningMode, PrintJob, PrinterMove, ProgressReportingMode,
};
use std::sync::Arc;

/// Communication state shared between a connection and its stream stages
pub type SharedState = Arc<RwLock<CommunicationState>>;
/// Active print job shared between a connection and its stream stages
pub type SharedJob = Arc<RwLock<Option<PrintJob>>>;
/// Positioning mode shared between a connection and its stream stages
pub type SharedPositioningMode = Arc<RwLock<PositioningMode>>;
/// Last commanded destination shared between a connection and its stream stages
pub type SharedDestination = Arc<RwLock<PrinterMove>>;

/// A pull-based source of G-code lines.
///
/// `read_line` returns `None` once the stream is exhausted, and keeps
/// returning `None` on every call after that. `set_printer_position`
/// informs a stage of the printer's last commanded destination, for
/// example after a manual command that bypassed the chain while paused.
/// Implementations update their own tracking and propagate the call to
/// the stage they wrap.
pub trait GcodeStream: Send {
    /// Next line to send, or `None` at end of stream
    fn read_line(&mut self) -> Option<String>;

    /// Inform the stage of the printer's last commanded destination
    fn set_printer_position(&mut self, position: PrinterMove);
}

/// Assemble the standard print chain over `source`:
/// normalization, then command injection, then progress reporting.
pub fn build_print_chain(
    source: Box<dyn GcodeStream>,
    injector: CommandInjector,
    destination: SharedDestination,
    positioning_mode: SharedPositioningMode,
    reporting_mode: ProgressReportingMode,
    state: SharedState,
    job: SharedJob,
) -> Box<dyn GcodeStream> {
    let normalized = NormalizingGcodeStream::new(source);
    let queued = QueuedCommandStream::new(
        Box::new(normalized),
        injector,
        destination,
        positioning_mode,
    );
    Box::new(ProgressReportStream::new(
        Box::new(queued),
        reporting_mode,
        state,
        job,
    ))
}
