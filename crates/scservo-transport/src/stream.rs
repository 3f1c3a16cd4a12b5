use std::io::{Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::serial::SerialConfig;

/// An open serial line to the servo bus. Implements Read + Write.
///
/// The line is half-duplex: every byte written is also observed on the read
/// side. Filtering that echo is the framing layer's job, not this one.
pub struct SerialStream {
    inner: Box<dyn SerialPort>,
    port: String,
}

impl SerialStream {
    /// Open a serial port as 8N1 without flow control.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let inner = serialport::new(config.port.as_str(), config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.read_timeout)
            .open()
            .map_err(|source| TransportError::Open {
                port: config.port.clone(),
                source,
            })?;

        info!(port = %config.port, baud = config.baud_rate, "opened serial port");

        Ok(Self {
            inner,
            port: config.port.clone(),
        })
    }

    /// Wrap an already opened port.
    pub fn from_port(inner: Box<dyn SerialPort>) -> Self {
        let port = inner.name().unwrap_or_else(|| "<unnamed>".to_string());
        Self { inner, port }
    }

    /// Port identifier this stream was opened on.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Set read timeout on the underlying port.
    pub fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.inner
            .set_timeout(timeout)
            .map_err(|source| TransportError::Configure {
                port: self.port.clone(),
                source,
            })
    }

    /// Try to clone this stream (creates a second handle to the same port).
    ///
    /// Used to split the line into a reader handle and a writer handle.
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self
            .inner
            .try_clone()
            .map_err(|source| TransportError::Configure {
                port: self.port.clone(),
                source,
            })?;
        debug!(port = %self.port, "cloned serial handle");
        Ok(Self {
            inner: cloned,
            port: self.port.clone(),
        })
    }
}

impl Read for SerialStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for SerialStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl std::fmt::Debug for SerialStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialStream")
            .field("port", &self.port)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_port_reports_port_name() {
        let cfg = SerialConfig::new("/dev/scservo-test-missing-port");
        let err = SerialStream::open(&cfg).unwrap_err();
        match err {
            TransportError::Open { port, .. } => {
                assert_eq!(port, "/dev/scservo-test-missing-port");
            }
            other => panic!("expected open error, got {other:?}"),
        }
    }
}
