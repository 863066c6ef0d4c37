//! G-code handling for PrintKit
//!
//! Two halves. The movement parser recognizes linear moves and folds
//! their per-axis words into complete printer destinations. The stream
//! pipeline feeds a print line by line through a chain of pull-based
//! stages over a file or in-memory source:
//!
//! - normalization (comments and blank lines removed)
//! - command injection (manual commands slipped ahead of file lines)
//! - progress reporting (`M73`/`M117` interleaved at half-percent steps)

pub mod movement;
pub mod stream;

pub use movement::{is_movement_line, parse_move, parse_partial, strip_comment};
pub use stream::{
    build_print_chain, CommandInjector, FileGcodeStream, GcodeStream, NormalizingGcodeStream,
    ProgressReportStream, QueuedCommandStream, SharedDestination, SharedJob,
    SharedPositioningMode, SharedState, StreamProgress, StringGcodeStream,
};
