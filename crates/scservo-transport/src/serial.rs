use std::time::Duration;

use serialport::SerialPortType;
use tracing::debug;

use crate::error::{Result, TransportError};

/// Baud rate SCS servos ship with.
pub const DEFAULT_BAUD_RATE: u32 = 1_000_000;

/// Default read timeout for blocking reads on the port.
///
/// Short enough that a reader loop notices shutdown promptly.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Configuration for opening a serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Port identifier (e.g. `/dev/ttyUSB0`, `COM3`).
    pub port: String,
    /// Line speed in bits per second. Default: 1 000 000.
    pub baud_rate: u32,
    /// Timeout for blocking reads.
    pub read_timeout: Duration,
}

impl SerialConfig {
    /// Configuration for `port` with default line settings.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Override the baud rate.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Override the read timeout.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }
}

/// A serial port visible on this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port identifier usable in [`SerialConfig::port`].
    pub name: String,
    /// Short description of the port type (`usb`, `pci`, `bluetooth`, `unknown`).
    pub kind: &'static str,
    /// USB product string, when the port is a USB adapter that reports one.
    pub product: Option<String>,
}

/// List serial ports available on this host.
pub fn available_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports().map_err(TransportError::Enumerate)?;
    debug!(count = ports.len(), "enumerated serial ports");

    Ok(ports
        .into_iter()
        .map(|port| {
            let (kind, product) = match port.port_type {
                SerialPortType::UsbPort(usb) => ("usb", usb.product),
                SerialPortType::PciPort => ("pci", None),
                SerialPortType::BluetoothPort => ("bluetooth", None),
                SerialPortType::Unknown => ("unknown", None),
            };
            PortInfo {
                name: port.port_name,
                kind,
                product,
            }
        })
        .collect())
}
