use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame preamble: 0xFF 0xFF.
pub const PREAMBLE: [u8; 2] = [0xFF, 0xFF];

/// Frame header: preamble (2) + id (1) + length (1) + command (1) + address (1).
pub const HEADER_SIZE: usize = 6;

/// Maximum number of parameter bytes in one frame.
pub const MAX_PARAMS: usize = 58;

/// Largest frame on the wire: header + params + checksum.
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + MAX_PARAMS + 1;

/// Highest assignable device id.
pub const MAX_ID: u8 = 0xFC;

/// Broadcast id. Devices never answer it, so no endpoint registers it.
pub const BROADCAST_ID: u8 = 0xFE;

/// Command byte of a frame.
///
/// `Read` and `Write` travel host → servo. `Response` and `ResponseAlt`
/// travel servo → host; some hardware revisions answer with `0x01` instead of
/// `0x00`, both are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Response = 0x00,
    ResponseAlt = 0x01,
    Read = 0x02,
    Write = 0x03,
}

impl Command {
    /// True for frames sent by a servo.
    pub fn is_response(self) -> bool {
        matches!(self, Command::Response | Command::ResponseAlt)
    }

    /// Human-readable name for logs.
    pub fn name(self) -> &'static str {
        match self {
            Command::Response => "RESPONSE",
            Command::ResponseAlt => "RESPONSE_ALT",
            Command::Read => "READ",
            Command::Write => "WRITE",
        }
    }
}

impl TryFrom<u8> for Command {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(Command::Response),
            0x01 => Ok(Command::ResponseAlt),
            0x02 => Ok(Command::Read),
            0x03 => Ok(Command::Write),
            other => Err(FrameError::UnknownCommand(other)),
        }
    }
}

impl From<Command> for u8 {
    fn from(command: Command) -> Self {
        command as u8
    }
}

/// A command frame addressed to one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Target (or source) device id.
    pub id: u8,
    /// Instruction or response code.
    pub command: Command,
    /// Register address the command operates on.
    pub address: u8,
    /// Parameter bytes following the address.
    pub params: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(id: u8, command: Command, address: u8, params: impl Into<Bytes>) -> Self {
        Self {
            id,
            command,
            address,
            params: params.into(),
        }
    }

    /// The total wire size of this frame (header + params + checksum).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.params.len() + 1
    }

    /// Encode this frame into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(self.wire_size());
        encode_frame(self.id, self.command, self.address, &self.params, &mut dst)?;
        Ok(dst.freeze())
    }
}

/// Complemented 8-bit sum of `bytes`.
///
/// Callers pass everything between the preamble and the checksum byte.
pub fn checksum(bytes: &[u8]) -> u8 {
    !bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌───────────┬────┬────────┬─────────┬─────────┬──────────┬──────────┐
/// │ Preamble  │ ID │ Length │ Command │ Address │ Params   │ Checksum │
/// │ 0xFF 0xFF │    │ n + 3  │         │         │ (n B)    │ ~sum     │
/// └───────────┴────┴────────┴─────────┴─────────┴──────────┴──────────┘
/// ```
/// The checksum covers id through the last parameter, never the preamble.
pub fn encode_frame(
    id: u8,
    command: Command,
    address: u8,
    params: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    if params.len() > MAX_PARAMS {
        return Err(FrameError::EncodeOverflow {
            size: params.len(),
            max: MAX_PARAMS,
        });
    }

    let start = dst.len();
    dst.reserve(HEADER_SIZE + params.len() + 1);
    dst.put_slice(&PREAMBLE);
    dst.put_u8(id);
    dst.put_u8((params.len() + 3) as u8);
    dst.put_u8(command.into());
    dst.put_u8(address);
    dst.put_slice(params);
    let cs = checksum(&dst[start + 2..]);
    dst.put_u8(cs);
    Ok(())
}

/// Encode a servo status reply: `FF FF id (n + 2) status params.. checksum`.
///
/// Replies carry no register address. Used by simulated devices and tests.
pub fn encode_response(id: u8, status: Command, params: &[u8], dst: &mut BytesMut) -> Result<()> {
    if params.len() > MAX_PARAMS + 1 {
        return Err(FrameError::EncodeOverflow {
            size: params.len(),
            max: MAX_PARAMS + 1,
        });
    }

    let start = dst.len();
    dst.reserve(params.len() + 6);
    dst.put_slice(&PREAMBLE);
    dst.put_u8(id);
    dst.put_u8((params.len() + 2) as u8);
    dst.put_u8(status.into());
    dst.put_slice(params);
    let cs = checksum(&dst[start + 2..]);
    dst.put_u8(cs);
    Ok(())
}

/// Decode one complete command frame from `src`.
///
/// `src` must hold exactly one frame, preamble through checksum. Frames whose
/// length byte leaves no room for an address byte are rejected; short status
/// replies go through [`StreamFramer`](crate::StreamFramer) instead.
pub fn decode_frame(src: &[u8]) -> Result<Frame> {
    if src.len() < HEADER_SIZE + 1 {
        return Err(FrameError::Truncated { len: src.len() });
    }
    if src[0..2] != PREAMBLE {
        return Err(FrameError::InvalidPreamble);
    }

    let length = src[3];
    if length < 3 || length as usize != src.len() - 4 {
        return Err(FrameError::InvalidLength(length));
    }

    let last = src.len() - 1;
    let expected = checksum(&src[2..last]);
    if expected != src[last] {
        return Err(FrameError::ChecksumMismatch {
            expected,
            actual: src[last],
        });
    }

    Ok(Frame {
        id: src[2],
        command: Command::try_from(src[4])?,
        address: src[5],
        params: Bytes::copy_from_slice(&src[HEADER_SIZE..last]),
    })
}
