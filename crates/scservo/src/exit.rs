use std::fmt;
use std::io;

use scservo_bus::BusError;
use scservo_frame::FrameError;
use scservo_transport::TransportError;

// Exit code constants, sysexits-style where one fits.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound
        | io::ErrorKind::PermissionDenied
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn bus_error(context: &str, err: BusError) -> CliError {
    match err {
        BusError::Transport(err) => transport_error(context, err),
        BusError::Frame(err) => frame_error(context, err),
        BusError::Io(err) => io_error(context, err),
        BusError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        BusError::ShortResponse { .. } => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        BusError::IdAlreadyRegistered(_)
        | BusError::InvalidId(_)
        | BusError::OffsetOutOfRange(_) => CliError::new(USAGE, format!("{context}: {err}")),
        BusError::Disconnected(_) => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn timeouts_map_to_timeout_code() {
        let err = bus_error("read failed", BusError::Timeout(Duration::from_millis(40)));
        assert_eq!(err.code, TIMEOUT);
        assert!(err.message.starts_with("read failed: "));
    }

    #[test]
    fn caller_mistakes_map_to_usage() {
        assert_eq!(bus_error("x", BusError::InvalidId(0xFE)).code, USAGE);
        assert_eq!(bus_error("x", BusError::OffsetOutOfRange(2500)).code, USAGE);
        assert_eq!(bus_error("x", BusError::IdAlreadyRegistered(2)).code, USAGE);
    }

    #[test]
    fn nested_errors_unwrap_to_their_layer() {
        let frame = BusError::Frame(FrameError::EncodeOverflow { size: 70, max: 58 });
        assert_eq!(bus_error("x", frame).code, DATA_INVALID);

        let io = BusError::Transport(TransportError::Io(io::Error::from(io::ErrorKind::BrokenPipe)));
        assert_eq!(bus_error("x", io).code, TRANSPORT_ERROR);

        let short = BusError::ShortResponse {
            expected: 2,
            actual: 0,
        };
        assert_eq!(bus_error("x", short).code, DATA_INVALID);
    }
}
