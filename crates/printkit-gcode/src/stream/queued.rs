//! Command injection stage
//!
//! Lets callers slip manual commands into an active print. Injected
//! commands are handed out strictly FIFO and always ahead of the next
//! line from the wrapped stream. This stage also folds every outgoing
//! movement line into the shared destination so the rest of the host
//! always knows where the printer is headed.

use super::{GcodeStream, SharedDestination, SharedPositioningMode};
use crate::movement;
use parking_lot::Mutex;
use printkit_core::PrinterMove;
use std::collections::VecDeque;
use std::sync::Arc;

/// Cloneable handle onto a FIFO of pending manual commands.
///
/// One injector is shared between the [`QueuedCommandStream`] that drains
/// it mid-print and the connection that drains it directly while paused.
#[derive(Clone, Default)]
pub struct CommandInjector {
    queue: Arc<Mutex<VecDeque<String>>>,
}

impl CommandInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one or more commands. Multi-line input is split and queued
    /// in order; blank lines are dropped.
    pub fn add(&self, commands: &str) {
        let mut queue = self.queue.lock();
        for line in commands.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            queue.push_back(line.to_string());
        }
    }

    /// Take the oldest pending command, if any
    pub fn pop(&self) -> Option<String> {
        self.queue.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Drop all pending commands
    pub fn clear(&self) {
        self.queue.lock().clear();
    }
}

impl std::fmt::Debug for CommandInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandInjector")
            .field("pending", &self.len())
            .finish()
    }
}

/// Stage that yields injected commands ahead of the wrapped stream and
/// tracks the printer's destination across everything it hands out.
pub struct QueuedCommandStream {
    inner: Box<dyn GcodeStream>,
    injector: CommandInjector,
    destination: SharedDestination,
    positioning_mode: SharedPositioningMode,
}

impl QueuedCommandStream {
    pub fn new(
        inner: Box<dyn GcodeStream>,
        injector: CommandInjector,
        destination: SharedDestination,
        positioning_mode: SharedPositioningMode,
    ) -> Self {
        Self {
            inner,
            injector,
            destination,
            positioning_mode,
        }
    }

    fn fold_movement(&mut self, line: &str) {
        let Some(partial) = movement::parse_partial(line) else {
            return;
        };
        let mode = *self.positioning_mode.read();
        let next = {
            let mut destination = self.destination.write();
            let updated = partial.apply_to(&destination, mode);
            *destination = updated;
            updated
        };
        self.inner.set_printer_position(next);
    }
}

impl GcodeStream for QueuedCommandStream {
    fn read_line(&mut self) -> Option<String> {
        let line = match self.injector.pop() {
            Some(command) => {
                tracing::debug!("Injecting queued command: {}", command);
                Some(command)
            }
            None => self.inner.read_line(),
        };
        if let Some(ref line) = line {
            self.fold_movement(line);
        }
        line
    }

    fn set_printer_position(&mut self, position: PrinterMove) {
        *self.destination.write() = position;
        self.inner.set_printer_position(position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::testing::ScriptedStream;
    use parking_lot::RwLock;
    use printkit_core::{PositioningMode, Vector3};

    fn stage(
        lines: &[&str],
        injector: CommandInjector,
    ) -> (QueuedCommandStream, SharedDestination) {
        let destination: SharedDestination = Arc::new(RwLock::new(PrinterMove::default()));
        let mode: SharedPositioningMode = Arc::new(RwLock::new(PositioningMode::Absolute));
        let stream = QueuedCommandStream::new(
            Box::new(ScriptedStream::new(lines)),
            injector,
            destination.clone(),
            mode,
        );
        (stream, destination)
    }

    #[test]
    fn injected_commands_come_first_in_fifo_order() {
        let injector = CommandInjector::new();
        injector.add("M104 S200");
        injector.add("M140 S60");
        let (mut stream, _) = stage(&["G1 X10"], injector.clone());

        assert_eq!(stream.read_line().as_deref(), Some("M104 S200"));
        assert_eq!(stream.read_line().as_deref(), Some("M140 S60"));
        assert_eq!(stream.read_line().as_deref(), Some("G1 X10"));
        assert_eq!(stream.read_line(), None);
        assert!(injector.is_empty());
    }

    #[test]
    fn commands_injected_mid_print_preempt_the_file() {
        let injector = CommandInjector::new();
        let (mut stream, _) = stage(&["G1 X1", "G1 X2"], injector.clone());

        assert_eq!(stream.read_line().as_deref(), Some("G1 X1"));
        injector.add("M117 hello");
        assert_eq!(stream.read_line().as_deref(), Some("M117 hello"));
        assert_eq!(stream.read_line().as_deref(), Some("G1 X2"));
    }

    #[test]
    fn concurrent_producers_keep_per_producer_order() {
        let injector = CommandInjector::new();
        let writers: Vec<_> = (0..4)
            .map(|id| {
                let handle = injector.clone();
                std::thread::spawn(move || {
                    for n in 0..25 {
                        handle.add(&format!("M117 p{} n{}", id, n));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }
        assert_eq!(injector.len(), 100);

        let mut next = [0usize; 4];
        while let Some(line) = injector.pop() {
            let mut words = line.split_whitespace().skip(1);
            let id: usize = words.next().unwrap()[1..].parse().unwrap();
            let n: usize = words.next().unwrap()[1..].parse().unwrap();
            assert_eq!(n, next[id], "producer {} delivered out of order", id);
            next[id] += 1;
        }
        assert_eq!(next, [25; 4]);
    }

    #[test]
    fn multi_line_input_is_split_and_ordered() {
        let injector = CommandInjector::new();
        injector.add("G28\r\nM104 S210\n\nM140 S60");
        assert_eq!(injector.len(), 3);
        assert_eq!(injector.pop().as_deref(), Some("G28"));
        assert_eq!(injector.pop().as_deref(), Some("M104 S210"));
        assert_eq!(injector.pop().as_deref(), Some("M140 S60"));
        assert_eq!(injector.pop(), None);
    }

    #[test]
    fn movement_lines_update_the_shared_destination() {
        let injector = CommandInjector::new();
        injector.add("G1 X5 Y5");
        let (mut stream, destination) = stage(&["G1 Z2 F1200"], injector);

        stream.read_line();
        assert_eq!(destination.read().position.x, 5.0);
        stream.read_line();
        let dest = *destination.read();
        // Z line inherits X/Y from the injected move
        assert_eq!(dest.position.x, 5.0);
        assert_eq!(dest.position.z, 2.0);
        assert_eq!(dest.feed_rate, 1200.0);
    }

    #[test]
    fn positions_propagate_to_the_wrapped_stream() {
        let source = ScriptedStream::new(&["G1 X3", "M105"]);
        let observed = source.positions();
        let destination: SharedDestination = Arc::new(RwLock::new(PrinterMove::default()));
        let mode: SharedPositioningMode = Arc::new(RwLock::new(PositioningMode::Absolute));
        let mut stream =
            QueuedCommandStream::new(Box::new(source), CommandInjector::new(), destination, mode);

        stream.read_line();
        assert_eq!(observed.lock().len(), 1);
        assert_eq!(observed.lock()[0].position.x, 3.0);

        // Non-movement lines leave tracking alone
        stream.read_line();
        assert_eq!(observed.lock().len(), 1);

        stream.set_printer_position(PrinterMove::at(Vector3::new(9.0, 9.0, 9.0)));
        assert_eq!(observed.lock().len(), 2);
        assert_eq!(observed.lock()[1].position.z, 9.0);
    }

    #[test]
    fn relative_mode_folds_offsets() {
        let injector = CommandInjector::new();
        let destination: SharedDestination =
            Arc::new(RwLock::new(PrinterMove::at(Vector3::new(10.0, 10.0, 0.0))));
        let mode: SharedPositioningMode = Arc::new(RwLock::new(PositioningMode::Relative));
        let mut stream = QueuedCommandStream::new(
            Box::new(ScriptedStream::new(&["G1 X-2 Y3"])),
            injector,
            destination.clone(),
            mode,
        );

        stream.read_line();
        let dest = *destination.read();
        assert_eq!(dest.position.x, 8.0);
        assert_eq!(dest.position.y, 13.0);
    }
}
