/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The received checksum does not match the computed one.
    #[error("checksum mismatch (computed 0x{expected:02X}, received 0x{actual:02X})")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// The command byte is not a known instruction or response code.
    #[error("unknown command byte 0x{0:02X}")]
    UnknownCommand(u8),

    /// The length byte cannot describe a valid frame.
    #[error("invalid frame length {0}")]
    InvalidLength(u8),

    /// The buffer does not start with the `0xFF 0xFF` preamble.
    #[error("invalid frame preamble (expected 0xFF 0xFF)")]
    InvalidPreamble,

    /// The buffer is shorter than its header claims.
    #[error("truncated frame ({len} bytes)")]
    Truncated { len: usize },

    /// Too many parameters to fit the transmit buffer.
    #[error("too many parameters ({size}, max {max})")]
    EncodeOverflow { size: usize, max: usize },

    /// An I/O error occurred while writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
