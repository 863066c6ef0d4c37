//! Source streams
//!
//! The innermost nodes of a stream chain: an in-memory line buffer and a
//! file loader on top of it. Both publish consumed/total line counts
//! through a shared [`StreamProgress`] handle the connection uses to
//! derive percent-complete.

use super::GcodeStream;
use printkit_core::{GcodeError, PrinterMove, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Consumed/total line counters shared between a source stream and the
/// connection that owns the print.
///
/// Progress is a pure ratio of lines, independent of how stages above the
/// source transform or inject traffic.
#[derive(Debug, Default)]
pub struct StreamProgress {
    total: AtomicUsize,
    consumed: AtomicUsize,
}

impl StreamProgress {
    fn with_total(total: usize) -> Arc<Self> {
        Arc::new(Self {
            total: AtomicUsize::new(total),
            consumed: AtomicUsize::new(0),
        })
    }

    /// Total lines in the source
    pub fn total_lines(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    /// Lines handed out by the source so far
    pub fn lines_consumed(&self) -> usize {
        self.consumed.load(Ordering::Relaxed)
    }

    /// Percent of the source consumed, 0..=100
    pub fn percent_complete(&self) -> f64 {
        let total = self.total_lines();
        if total == 0 {
            return 0.0;
        }
        (self.lines_consumed() as f64 / total as f64) * 100.0
    }

    pub(crate) fn record_line(&self) {
        self.consumed.fetch_add(1, Ordering::Relaxed);
    }
}

/// In-memory source stream over a fixed set of lines
#[derive(Debug)]
pub struct StringGcodeStream {
    lines: Vec<String>,
    index: usize,
    progress: Arc<StreamProgress>,
    last_position: PrinterMove,
}

impl StringGcodeStream {
    /// Create a source over the lines of `content`
    pub fn new(content: &str) -> Self {
        Self::from_lines(content.lines().map(String::from).collect())
    }

    /// Create a source over pre-split lines
    pub fn from_lines(lines: Vec<String>) -> Self {
        let progress = StreamProgress::with_total(lines.len());
        Self {
            lines,
            index: 0,
            progress,
            last_position: PrinterMove::default(),
        }
    }

    /// Shared progress counters for this source
    pub fn progress(&self) -> Arc<StreamProgress> {
        self.progress.clone()
    }

    /// Total lines in the source
    pub fn total_lines(&self) -> usize {
        self.lines.len()
    }
}

impl GcodeStream for StringGcodeStream {
    fn read_line(&mut self) -> Option<String> {
        let line = self.lines.get(self.index)?.clone();
        self.index += 1;
        self.progress.record_line();
        Some(line)
    }

    fn set_printer_position(&mut self, position: PrinterMove) {
        self.last_position = position;
    }
}

/// Source stream that loads a G-code file into memory at construction.
///
/// I/O happens once in [`FileGcodeStream::open`]; the read loop never
/// touches the filesystem.
#[derive(Debug)]
pub struct FileGcodeStream {
    inner: StringGcodeStream,
    path: PathBuf,
}

impl FileGcodeStream {
    /// Load `path` and build a source over its lines
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| GcodeError::FileError {
            reason: format!("{}: {}", path.display(), e),
        })?;
        tracing::info!(
            "Loaded {} ({} lines)",
            path.display(),
            content.lines().count()
        );
        Ok(Self {
            inner: StringGcodeStream::new(&content),
            path: path.to_path_buf(),
        })
    }

    /// Path the stream was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Short description for job tracking (file name without directories)
    pub fn description(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Shared progress counters for this source
    pub fn progress(&self) -> Arc<StreamProgress> {
        self.inner.progress()
    }

    /// Total lines in the source
    pub fn total_lines(&self) -> usize {
        self.inner.total_lines()
    }
}

impl GcodeStream for FileGcodeStream {
    fn read_line(&mut self) -> Option<String> {
        self.inner.read_line()
    }

    fn set_printer_position(&mut self, position: PrinterMove) {
        self.inner.set_printer_position(position);
    }
}
