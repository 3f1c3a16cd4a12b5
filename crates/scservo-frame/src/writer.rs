use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{encode_frame, Command, Frame, MAX_FRAME_SIZE};
use crate::error::{FrameError, Result};

/// Writes complete command frames to any `Write` stream.
///
/// Frames are encoded into a fixed-capacity transmit buffer and written in
/// one go; there is no batching or queuing between calls.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(MAX_FRAME_SIZE),
        }
    }

    /// Write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<usize> {
        self.send(frame.id, frame.command, frame.address, &frame.params)
    }

    /// Encode and send a command. Returns the number of bytes written.
    pub fn send(&mut self, id: u8, command: Command, address: u8, params: &[u8]) -> Result<usize> {
        self.buf.clear();
        encode_frame(id, command, address, params, &mut self.buf)?;
        trace!(id, command = command.name(), frame = ?&self.buf[..], "writing frame");
        self.write_encoded()?;
        Ok(self.buf.len())
    }

    /// Write pre-encoded bytes as they are.
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.buf.clear();
        self.buf.extend_from_slice(bytes);
        self.write_encoded()
    }

    fn write_encoded(&mut self) -> Result<()> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => {
                    return Err(FrameError::Io(std::io::Error::from(ErrorKind::WriteZero)))
                }
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
