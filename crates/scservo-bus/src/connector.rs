use std::sync::Arc;

use scservo_transport::{SerialConfig, SerialStream};
use tracing::info;

use crate::bus::{Bus, BusConfig, ReaderHandle};
use crate::error::Result;

/// A [`Bus`] running on a host serial port, with its reader thread.
#[derive(Debug)]
pub struct SerialBus {
    bus: Arc<Bus>,
    reader: ReaderHandle,
}

impl SerialBus {
    /// The bus; hand clones of it to [`Servo::new`](crate::Servo::new).
    pub fn bus(&self) -> &Arc<Bus> {
        &self.bus
    }

    /// Stop the reader thread. Endpoints still holding the bus can transmit
    /// but will not see responses any more.
    pub fn close(self) -> Result<()> {
        info!("closing serial bus");
        self.reader.stop()
    }
}

/// Open a serial port and start a bus on it with default settings.
pub fn connect(serial: &SerialConfig) -> Result<SerialBus> {
    connect_with_config(serial, BusConfig::default())
}

/// Open a serial port and start a bus on it.
///
/// The port is split into two handles: one transmits through the bus, the
/// other feeds a background reader thread.
pub fn connect_with_config(serial: &SerialConfig, config: BusConfig) -> Result<SerialBus> {
    let stream = SerialStream::open(serial)?;
    let reader_stream = stream.try_clone()?;

    let bus = Arc::new(Bus::with_config(stream, config));
    let reader = bus.spawn_reader(reader_stream)?;
    info!(port = %serial.port, timeout = ?bus.config().response_timeout, "servo bus ready");

    Ok(SerialBus { bus, reader })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BusError;

    #[test]
    fn missing_port_is_a_transport_error() {
        let err = connect(&SerialConfig::new("/dev/scservo-test-no-such-port")).unwrap_err();
        assert!(matches!(err, BusError::Transport(_)));
    }
}
