//! Progress reporting stage
//!
//! Head of the print chain. Watches the active job's percent-complete
//! and, whenever it has advanced more than half a percent past the last
//! report, hands out a synthesized progress command instead of pulling
//! the next file line. The wrapped stream is untouched on those reads,
//! so reports never displace print content.

use super::{GcodeStream, SharedJob, SharedState};
use printkit_core::{CommunicationState, PrinterMove, ProgressReportingMode};

/// Stage that interleaves `M73`/`M117` progress commands into the
/// outgoing line flow.
pub struct ProgressReportStream {
    inner: Box<dyn GcodeStream>,
    mode: ProgressReportingMode,
    state: SharedState,
    job: SharedJob,
    next_threshold: f64,
}

impl ProgressReportStream {
    pub fn new(
        inner: Box<dyn GcodeStream>,
        mode: ProgressReportingMode,
        state: SharedState,
        job: SharedJob,
    ) -> Self {
        Self {
            inner,
            mode,
            state,
            job,
            // First report fires as soon as any progress registers
            next_threshold: 0.5,
        }
    }

    fn pending_report(&mut self) -> Option<String> {
        if self.mode == ProgressReportingMode::None {
            return None;
        }
        if *self.state.read() != CommunicationState::Printing {
            return None;
        }
        let percent = {
            let job = self.job.read();
            let job = job.as_ref()?;
            if !job.is_active() {
                return None;
            }
            job.percent_done()
        };
        if percent <= self.next_threshold {
            return None;
        }
        let rounded = percent.round();
        self.next_threshold = rounded + 0.5;
        tracing::debug!("Reporting progress at {:.1}%", percent);
        match self.mode {
            ProgressReportingMode::M73 => Some(format!("M73 P{}", rounded as u32)),
            ProgressReportingMode::M117 => Some(format!("M117 {}% complete", rounded as u32)),
            ProgressReportingMode::None => None,
        }
    }
}

impl GcodeStream for ProgressReportStream {
    fn read_line(&mut self) -> Option<String> {
        if let Some(report) = self.pending_report() {
            return Some(report);
        }
        self.inner.read_line()
    }

    fn set_printer_position(&mut self, position: PrinterMove) {
        self.inner.set_printer_position(position);
    }
}
