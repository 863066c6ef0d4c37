//! Normalization stage
//!
//! Sits directly above the source and guarantees that everything flowing
//! up the chain is a bare command: comments stripped, whitespace trimmed,
//! blank lines gone.

use super::GcodeStream;
use crate::movement;
use printkit_core::PrinterMove;

/// Stage that strips `;` comments and surrounding whitespace, pulling
/// from the wrapped stream until a non-empty command remains.
pub struct NormalizingGcodeStream {
    inner: Box<dyn GcodeStream>,
}

impl NormalizingGcodeStream {
    pub fn new(inner: Box<dyn GcodeStream>) -> Self {
        Self { inner }
    }
}

impl GcodeStream for NormalizingGcodeStream {
    fn read_line(&mut self) -> Option<String> {
        loop {
            let line = self.inner.read_line()?;
            let cleaned = movement::strip_comment(&line).trim();
            if !cleaned.is_empty() {
                return Some(cleaned.to_string());
            }
        }
    }

    fn set_printer_position(&mut self, position: PrinterMove) {
        self.inner.set_printer_position(position);
    }
}
