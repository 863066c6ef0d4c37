//! Serial port transport
//!
//! Port enumeration, printer-port discovery, and the serialport-backed
//! [`LineTransport`] used for real hardware.
//!
//! Printers speak 8N1 with no flow control. The read timeout is kept
//! short so the connection worker can interleave reads with writes and
//! timeout checks on a single task.

use super::{ConnectionParams, LineTransport};
use printkit_core::{Result, TransportError};
use std::io::{Read, Write};
use std::time::Duration;

/// Read poll granularity for the worker loop
const READ_TIMEOUT_MS: u64 = 50;

/// USB vendor IDs that commonly appear on printer control boards:
/// Arduino, WCH (CH340), FTDI, Silicon Labs (CP210x), Prusa, OpenMoko
const KNOWN_PRINTER_VIDS: [u16; 6] = [0x2341, 0x1A86, 0x0403, 0x10C4, 0x2C99, 0x1D50];

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Serial Port")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// Serial number if available
    pub serial_number: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    /// Create a new port info
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            serial_number: None,
            vid: None,
            pid: None,
        }
    }

    /// Set manufacturer
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Set serial number
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    /// Set USB IDs
    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.vid = Some(vid);
        self.pid = Some(pid);
        self
    }

    /// Whether this port looks like a 3D printer.
    ///
    /// A known control-board vendor ID is taken as a match outright;
    /// otherwise the port name must follow the USB serial patterns
    /// printers show up under.
    pub fn is_likely_printer(&self) -> bool {
        if let Some(vid) = self.vid {
            if KNOWN_PRINTER_VIDS.contains(&vid) {
                return true;
            }
        }
        is_usb_serial_name(&self.port_name)
    }
}

/// List available serial ports on the system
///
/// Returns every enumerable port; use [`SerialPortInfo::is_likely_printer`]
/// to pick out printer candidates. Typical printer ports:
/// - Windows: COM* (e.g., COM1, COM3)
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    match serialport::available_ports() {
        Ok(ports) => {
            let port_infos: Vec<SerialPortInfo> = ports
                .iter()
                .map(|port| {
                    let info = SerialPortInfo::new(&port.port_name, get_port_description(port));

                    match &port.port_type {
                        serialport::SerialPortType::UsbPort(usb_info) => {
                            let mut info = info.with_usb_ids(usb_info.vid, usb_info.pid);
                            if let Some(ref mfg) = usb_info.manufacturer {
                                info = info.with_manufacturer(mfg);
                            }
                            if let Some(ref serial) = usb_info.serial_number {
                                info = info.with_serial_number(serial);
                            }
                            info
                        }
                        _ => info,
                    }
                })
                .collect();

            Ok(port_infos)
        }
        Err(e) => {
            tracing::error!("Failed to enumerate serial ports: {}", e);
            Err(TransportError::Other {
                message: format!("Failed to enumerate ports: {}", e),
            }
            .into())
        }
    }
}

/// First port that looks like a printer, if any
pub fn find_printer_port() -> Result<Option<String>> {
    Ok(list_ports()?
        .into_iter()
        .find(|port| port.is_likely_printer())
        .map(|port| port.port_name))
}

/// Check if a port name matches USB serial patterns
fn is_usb_serial_name(port_name: &str) -> bool {
    // Windows COM ports
    if port_name.starts_with("COM") && port_name[3..].chars().all(|c| c.is_ascii_digit()) {
        return true;
    }

    // Linux USB and ACM devices
    if port_name.starts_with("/dev/ttyUSB") || port_name.starts_with("/dev/ttyACM") {
        return true;
    }

    // macOS serial and modem devices
    if port_name.starts_with("/dev/cu.usbserial") || port_name.starts_with("/dev/cu.usbmodem") {
        return true;
    }

    false
}

/// Get a user-friendly description for a port
fn get_port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => {
            format!(
                "USB {} {}",
                usb_info.manufacturer.as_deref().unwrap_or("Device"),
                usb_info.product.as_deref().unwrap_or("Serial Port")
            )
        }
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Map a serialport open failure onto the transport error taxonomy
fn classify_open_error(port: &str, error: serialport::Error) -> printkit_core::Error {
    let transport_error = match error.kind {
        serialport::ErrorKind::NoDevice => TransportError::PortNotFound {
            port: port.to_string(),
        },
        serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => TransportError::PortNotFound {
            port: port.to_string(),
        },
        serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            TransportError::PortInUse {
                port: port.to_string(),
            }
        }
        _ => TransportError::FailedToOpen {
            port: port.to_string(),
            reason: error.to_string(),
        },
    };
    transport_error.into()
}

/// Extract the next complete line from an accumulation buffer.
///
/// Consumes through the newline. Blank lines are swallowed; firmwares
/// terminate with `\r\n` and the `\r` is trimmed away here.
fn take_line(pending: &mut String) -> Option<String> {
    while let Some(pos) = pending.find('\n') {
        let line = pending[..pos].trim().to_string();
        pending.drain(..=pos);
        if !line.is_empty() {
            return Some(line);
        }
    }
    None
}

/// Real serial link using the serialport crate
pub struct SerialTransport {
    /// `None` once closed; dropping the handle releases the device so
    /// the same port can be reopened.
    port: Option<Box<dyn serialport::SerialPort>>,
    port_name: String,
    baud_rate: u32,
    /// Bytes received but not yet forming a complete line
    pending: String,
}

impl SerialTransport {
    /// Open `params.port` at `params.baud_rate`, 8N1, no flow control
    pub fn open(params: &ConnectionParams) -> Result<Self> {
        let port = serialport::new(&params.port, params.baud_rate)
            .timeout(Duration::from_millis(READ_TIMEOUT_MS))
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|e| {
                tracing::warn!("Failed to open serial port {}: {}", params.port, e);
                classify_open_error(&params.port, e)
            })?;

        tracing::info!("Opened {} at {} baud", params.port, params.baud_rate);
        Ok(Self {
            port: Some(port),
            port_name: params.port.clone(),
            baud_rate: params.baud_rate,
            pending: String::new(),
        })
    }
}

impl LineTransport for SerialTransport {
    fn write_line(&mut self, line: &str) -> Result<()> {
        let Some(port) = self.port.as_mut() else {
            return Err(TransportError::NotOpen.into());
        };
        port.write_all(line.as_bytes())
            .and_then(|_| port.write_all(b"\n"))
            .and_then(|_| port.flush())
            .map_err(|e| {
                TransportError::WriteFailed {
                    reason: e.to_string(),
                }
                .into()
            })
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let Some(port) = self.port.as_mut() else {
            return Err(TransportError::NotOpen.into());
        };
        if let Some(line) = take_line(&mut self.pending) {
            return Ok(Some(line));
        }

        let mut buf = [0u8; 256];
        match port.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(n) => {
                self.pending.push_str(&String::from_utf8_lossy(&buf[..n]));
                Ok(take_line(&mut self.pending))
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::Interrupted =>
            {
                Ok(None)
            }
            Err(e) => Err(TransportError::ReadFailed {
                reason: e.to_string(),
            }
            .into()),
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            tracing::info!("Closing {}", self.port_name);
        }
        Ok(())
    }

    fn description(&self) -> String {
        format!("{} @ {} baud", self.port_name, self.baud_rate)
    }
}
