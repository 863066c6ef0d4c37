//! Print job tracking
//!
//! A [`PrintJob`] is the progress/outcome record for one print attempt.
//! It is created when a print starts, updated continuously by the
//! connection while printing, and finalized exactly once on completion,
//! cancellation, or failure.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Final (or pending) outcome of a print attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    /// The job is still running
    InProgress,
    /// The stream ran to completion
    Completed,
    /// The user canceled the print
    Canceled,
    /// The print failed
    Failed {
        /// Human-readable failure reason.
        reason: String,
    },
}

/// Progress/outcome record for one print attempt
///
/// Percent-complete is monotonically non-decreasing for the lifetime of
/// the job; attempts to move it backwards are ignored.
#[derive(Debug, Clone)]
pub struct PrintJob {
    /// Short description of the job, usually the file name
    description: String,
    /// Total number of lines in the source stream
    total_lines: usize,
    /// Lines sent to the printer so far
    lines_sent: u64,
    /// Monotonic percent complete, 0..=100
    percent_done: f64,
    /// When the job started
    started_at: Instant,
    /// When the job was finalized, if it has been
    finished_at: Option<Instant>,
    /// Remaining-time hint from the stream (M73 R), with its arrival time
    remaining_hint: Option<(f64, Instant)>,
    /// Outcome, `InProgress` until finalized
    outcome: JobOutcome,
}

impl PrintJob {
    /// Create a new in-progress job
    pub fn new(description: impl Into<String>, total_lines: usize) -> Self {
        Self {
            description: description.into(),
            total_lines,
            lines_sent: 0,
            percent_done: 0.0,
            started_at: Instant::now(),
            finished_at: None,
            remaining_hint: None,
            outcome: JobOutcome::InProgress,
        }
    }

    /// Job description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Total lines in the source stream
    pub fn total_lines(&self) -> usize {
        self.total_lines
    }

    /// Lines sent to the printer so far
    pub fn lines_sent(&self) -> u64 {
        self.lines_sent
    }

    /// Record one more transmitted line
    pub fn record_line_sent(&mut self) {
        self.lines_sent += 1;
    }

    /// Current percent complete, 0..=100
    pub fn percent_done(&self) -> f64 {
        self.percent_done
    }

    /// Fold in a new percent-complete reading.
    ///
    /// Readings below the current value are ignored so the reported
    /// number never moves backwards within one job.
    pub fn update_percent_done(&mut self, percent: f64) {
        let clamped = percent.clamp(0.0, 100.0);
        if clamped > self.percent_done {
            self.percent_done = clamped;
        }
    }

    /// Seconds elapsed since the job started (frozen once finalized)
    pub fn seconds_printed(&self) -> f64 {
        match self.finished_at {
            Some(end) => end.duration_since(self.started_at).as_secs_f64(),
            None => self.started_at.elapsed().as_secs_f64(),
        }
    }

    /// Install a remaining-time hint (from an `M73 R<minutes>` line)
    pub fn set_remaining_hint(&mut self, seconds: f64) {
        self.remaining_hint = Some((seconds.max(0.0), Instant::now()));
    }

    /// Estimated seconds until the job completes.
    ///
    /// Prefers the most recent stream-provided hint, aged by the time
    /// since it arrived; otherwise extrapolates linearly from elapsed
    /// time and percent complete. Zero when no estimate is possible.
    pub fn estimated_seconds_to_end(&self) -> f64 {
        if self.outcome != JobOutcome::InProgress {
            return 0.0;
        }
        if let Some((hint, at)) = self.remaining_hint {
            return (hint - at.elapsed().as_secs_f64()).max(0.0);
        }
        if self.percent_done > 0.0 {
            let elapsed = self.seconds_printed();
            return elapsed * (100.0 - self.percent_done) / self.percent_done;
        }
        0.0
    }

    /// Outcome of the job
    pub fn outcome(&self) -> &JobOutcome {
        &self.outcome
    }

    /// Whether the job has not yet been finalized
    pub fn is_active(&self) -> bool {
        self.outcome == JobOutcome::InProgress
    }

    /// Finalize as completed
    pub fn mark_completed(&mut self) {
        debug_assert!(self.is_active(), "job finalized twice");
        self.percent_done = 100.0;
        self.outcome = JobOutcome::Completed;
        self.finished_at = Some(Instant::now());
    }

    /// Finalize as canceled
    pub fn mark_canceled(&mut self) {
        debug_assert!(self.is_active(), "job finalized twice");
        self.outcome = JobOutcome::Canceled;
        self.finished_at = Some(Instant::now());
    }

    /// Finalize as failed
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        debug_assert!(self.is_active(), "job finalized twice");
        self.outcome = JobOutcome::Failed {
            reason: reason.into(),
        };
        self.finished_at = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_monotonic() {
        let mut job = PrintJob::new("test", 100);
        job.update_percent_done(10.0);
        job.update_percent_done(25.5);
        job.update_percent_done(20.0);
        assert_eq!(job.percent_done(), 25.5);
    }

    #[test]
    fn percent_is_clamped() {
        let mut job = PrintJob::new("test", 100);
        job.update_percent_done(150.0);
        assert_eq!(job.percent_done(), 100.0);
        job.update_percent_done(-5.0);
        assert_eq!(job.percent_done(), 100.0);
    }

    #[test]
    fn completion_forces_full_percent() {
        let mut job = PrintJob::new("test", 10);
        job.update_percent_done(99.2);
        job.mark_completed();
        assert_eq!(job.percent_done(), 100.0);
        assert_eq!(*job.outcome(), JobOutcome::Completed);
        assert!(!job.is_active());
    }

    #[test]
    fn failed_jobs_keep_the_reason() {
        let mut job = PrintJob::new("test", 10);
        job.mark_failed("port unplugged");
        match job.outcome() {
            JobOutcome::Failed { reason } => assert_eq!(reason, "port unplugged"),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn estimate_extrapolates_from_percent() {
        let mut job = PrintJob::new("test", 10);
        job.update_percent_done(50.0);
        // At 50% the remaining estimate equals the elapsed time
        let eta = job.estimated_seconds_to_end();
        assert!((eta - job.seconds_printed()).abs() < 0.05);
    }

    #[test]
    fn hint_overrides_extrapolation() {
        let mut job = PrintJob::new("test", 10);
        job.update_percent_done(10.0);
        job.set_remaining_hint(600.0);
        let eta = job.estimated_seconds_to_end();
        assert!(eta > 599.0 && eta <= 600.0);
    }
}
