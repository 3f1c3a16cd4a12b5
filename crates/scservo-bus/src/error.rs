use std::time::Duration;

use scservo_frame::MAX_ID;

/// Errors that can occur in bus and servo operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] scservo_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] scservo_frame::FrameError),

    /// I/O error on the bus stream.
    #[error("bus I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Another endpoint already owns this id.
    #[error("servo id {0} is already registered on this bus")]
    IdAlreadyRegistered(u8),

    /// Id outside the assignable range.
    #[error("servo id {0} is out of range (max {MAX_ID})")]
    InvalidId(u8),

    /// No response arrived in time.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The response payload is shorter than the request asked for.
    #[error("short response: expected {expected} bytes, got {actual}")]
    ShortResponse { expected: usize, actual: usize },

    /// Calibration offset outside the encodable range.
    #[error("offset {0} out of range (-2000..=2000)")]
    OffsetOutOfRange(i16),

    /// The bus or the endpoint went away.
    #[error("bus disconnected: {0}")]
    Disconnected(String),
}

pub type Result<T> = std::result::Result<T, BusError>;
