//! Printer communication for PrintKit
//!
//! This crate owns the wire: serial port discovery and transport,
//! the Marlin-style firmware protocol, and the connection worker that
//! streams G-code with one-command-in-flight flow control.
//!
//! The entry point is [`PrinterConnection`]:
//!
//! ```no_run
//! use printkit_communication::{ConnectionParams, PrinterConnection};
//!
//! # async fn run() -> printkit_core::Result<()> {
//! let connection = PrinterConnection::new(ConnectionParams::new("/dev/ttyUSB0", 115_200));
//! let mut events = connection.subscribe();
//! connection.connect().await?;
//! connection.start_print("benchy.gcode").await?;
//! while let Ok(event) = events.recv().await {
//!     println!("{}", event.description());
//! }
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod firmware;
pub mod transport;

pub use connection::PrinterConnection;
pub use firmware::{FirmwareDialect, FirmwareResponse, MarlinDialect, TemperatureReport};
pub use transport::{
    find_printer_port, list_ports, ConnectionParams, LineTransport, SerialPortInfo,
    SerialTransport,
};
