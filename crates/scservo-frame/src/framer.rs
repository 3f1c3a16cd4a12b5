use bytes::Bytes;
use tracing::trace;

use crate::codec::{checksum, Command, MAX_FRAME_SIZE, PREAMBLE};
use crate::error::{FrameError, Result};

/// Smallest length byte that still carries a command and a checksum.
const MIN_LENGTH: u8 = 2;

/// Largest length byte the receive buffer can hold.
const MAX_LENGTH: usize = MAX_FRAME_SIZE - 4;

/// Framer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    /// Scanning for the `0xFF 0xFF` preamble.
    Seeking,
    /// Preamble seen, collecting id and length.
    Header,
    /// Collecting `length` more bytes.
    Body,
}

/// A checksum-valid frame recovered from the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// One of our own commands read back from the half-duplex line.
    Echo { id: u8, command: Command },
    /// A servo reply. `params` is everything between the command byte's
    /// successor and the checksum; empty for a plain write acknowledgment.
    Response {
        id: u8,
        command: Command,
        params: Bytes,
    },
}

impl Packet {
    /// Device id the packet carries.
    pub fn id(&self) -> u8 {
        match self {
            Packet::Echo { id, .. } | Packet::Response { id, .. } => *id,
        }
    }
}

/// Rebuilds packets from a serial byte stream, one byte at a time.
///
/// Malformed input is reported once per frame and the framer returns to
/// [`FramerState::Seeking`]; it never wedges. There is no backtracking once a
/// body starts, so a corrupted length byte costs everything up to the next
/// preamble match.
#[derive(Debug)]
pub struct StreamFramer {
    buf: [u8; MAX_FRAME_SIZE],
    idx: usize,
    remaining: usize,
    state: FramerState,
}

impl Default for StreamFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamFramer {
    /// Create a framer in the seeking state.
    pub fn new() -> Self {
        Self {
            buf: [0; MAX_FRAME_SIZE],
            idx: 0,
            remaining: 0,
            state: FramerState::Seeking,
        }
    }

    /// Current state.
    pub fn state(&self) -> FramerState {
        self.state
    }

    /// Discard any partial frame and start seeking again.
    pub fn reset(&mut self) {
        self.idx = 0;
        self.remaining = 0;
        self.state = FramerState::Seeking;
    }

    /// Consume one byte.
    ///
    /// Returns `Some` when the byte completes (or definitively breaks) a frame.
    pub fn push(&mut self, byte: u8) -> Option<Result<Packet>> {
        self.buf[self.idx] = byte;
        self.idx += 1;

        match self.state {
            FramerState::Seeking => {
                if self.idx < 2 {
                    return None;
                }
                if self.buf[..2] == PREAMBLE {
                    self.state = FramerState::Header;
                } else if byte == PREAMBLE[1] {
                    // The newest byte may still open a preamble.
                    self.buf[0] = byte;
                    self.idx = 1;
                } else {
                    self.idx = 0;
                }
                None
            }
            FramerState::Header => {
                if self.idx < 4 {
                    return None;
                }
                let length = self.buf[3];
                if length < MIN_LENGTH || usize::from(length) > MAX_LENGTH {
                    self.reset();
                    return Some(Err(FrameError::InvalidLength(length)));
                }
                self.remaining = usize::from(length);
                self.state = FramerState::Body;
                None
            }
            FramerState::Body => {
                self.remaining -= 1;
                if self.remaining > 0 {
                    return None;
                }
                let result = self.complete();
                self.reset();
                Some(result)
            }
        }
    }

    /// Consume a chunk of bytes, collecting every completed frame outcome.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<Packet>> {
        bytes.iter().filter_map(|b| self.push(*b)).collect()
    }

    fn complete(&self) -> Result<Packet> {
        let last = self.idx - 1;
        let expected = checksum(&self.buf[2..last]);
        let actual = self.buf[last];
        trace!(frame = ?&self.buf[..self.idx], "frame complete");

        if expected != actual {
            return Err(FrameError::ChecksumMismatch { expected, actual });
        }

        let id = self.buf[2];
        let command = Command::try_from(self.buf[4])?;
        if command.is_response() {
            Ok(Packet::Response {
                id,
                command,
                params: Bytes::copy_from_slice(&self.buf[5..last]),
            })
        } else {
            Ok(Packet::Echo { id, command })
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::codec::encode_frame;
    use crate::register;

    fn response(id: u8, command: u8, params: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_slice(&PREAMBLE);
        buf.put_u8(id);
        buf.put_u8((params.len() + 2) as u8);
        buf.put_u8(command);
        buf.put_slice(params);
        let cs = checksum(&buf[2..]);
        buf.put_u8(cs);
        buf.to_vec()
    }

    fn only_packet(results: Vec<Result<Packet>>) -> Packet {
        assert_eq!(results.len(), 1, "expected one frame, got {results:?}");
        results.into_iter().next().unwrap().unwrap()
    }

    #[test]
    fn reads_position_response() {
        let mut framer = StreamFramer::new();
        let packet = only_packet(framer.feed(&response(1, 0x00, &[0x02, 0x00])));

        assert_eq!(
            packet,
            Packet::Response {
                id: 1,
                command: Command::Response,
                params: Bytes::from_static(&[0x02, 0x00]),
            }
        );
        assert_eq!(framer.state(), FramerState::Seeking);
    }

    #[test]
    fn write_ack_has_empty_params() {
        let mut framer = StreamFramer::new();
        let packet = only_packet(framer.feed(&response(7, 0x00, &[])));
        match packet {
            Packet::Response { id, params, .. } => {
                assert_eq!(id, 7);
                assert!(params.is_empty());
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn accepts_alternate_response_code() {
        let mut framer = StreamFramer::new();
        let packet = only_packet(framer.feed(&response(3, 0x01, &[0x10])));
        assert!(matches!(
            packet,
            Packet::Response {
                id: 3,
                command: Command::ResponseAlt,
                ..
            }
        ));
    }

    #[test]
    fn own_commands_come_back_as_echo() {
        let mut wire = BytesMut::new();
        encode_frame(1, Command::Write, register::TORQUE_ENABLE, &[1], &mut wire).unwrap();
        encode_frame(1, Command::Read, register::PRESENT_POSITION, &[2], &mut wire).unwrap();

        let mut framer = StreamFramer::new();
        let packets: Vec<Packet> = framer.feed(&wire).into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(
            packets,
            vec![
                Packet::Echo {
                    id: 1,
                    command: Command::Write
                },
                Packet::Echo {
                    id: 1,
                    command: Command::Read
                },
            ]
        );
    }

    #[test]
    fn frame_amid_noise_is_delivered_once() {
        let mut stream = vec![0x00, 0x13, 0x37, 0xFF, 0x42, 0x99];
        stream.extend(response(4, 0x00, &[0x01, 0xF4]));
        stream.extend([0x12, 0x34, 0x56, 0x00, 0xFF]);

        let mut framer = StreamFramer::new();
        let packet = only_packet(framer.feed(&stream));

        assert_eq!(packet.id(), 4);
        assert_eq!(framer.state(), FramerState::Seeking);
    }

    #[test]
    fn odd_length_noise_still_syncs() {
        let mut stream = vec![0x10, 0x20, 0x30];
        stream.extend(response(2, 0x00, &[]));

        let mut framer = StreamFramer::new();
        let packet = only_packet(framer.feed(&stream));
        assert_eq!(packet.id(), 2);
    }

    #[test]
    fn overlapping_preamble_costs_one_frame() {
        // A stray 0xFF right before the preamble is taken as the preamble
        // start; the real second 0xFF then lands in the id slot. The frame is
        // lost to a checksum error but the following one is received.
        let mut stream = vec![0x10, 0x20, 0xFF];
        stream.extend(response(2, 0x00, &[]));
        stream.extend(response(3, 0x00, &[]));

        let mut framer = StreamFramer::new();
        let results = framer.feed(&stream);
        let ids: Vec<u8> = results
            .iter()
            .filter_map(|r| r.as_ref().ok().map(Packet::id))
            .collect();
        assert_eq!(ids, vec![3]);
        assert!(results.iter().any(|r| r.is_err()));
        assert_eq!(framer.state(), FramerState::Seeking);
    }

    #[test]
    fn corrupted_checksum_yields_nothing() {
        let mut frame = response(5, 0x00, &[0x02, 0x00]);
        let last = frame.len() - 1;
        frame[last] = frame[last].wrapping_add(1);

        let mut framer = StreamFramer::new();
        let results = framer.feed(&frame);

        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0],
            Err(FrameError::ChecksumMismatch { .. })
        ));
        assert_eq!(framer.state(), FramerState::Seeking);

        // Still usable afterwards.
        let packet = only_packet(framer.feed(&response(5, 0x00, &[])));
        assert_eq!(packet.id(), 5);
    }

    #[test]
    fn unknown_command_is_reported_and_skipped() {
        let mut framer = StreamFramer::new();
        let results = framer.feed(&response(1, 0x09, &[0x00]));
        assert!(matches!(results[0], Err(FrameError::UnknownCommand(0x09))));
        assert_eq!(framer.state(), FramerState::Seeking);
    }

    #[test]
    fn invalid_length_resets_to_seeking() {
        let mut framer = StreamFramer::new();
        let results = framer.feed(&[0xFF, 0xFF, 0x01, 0x01]);
        assert!(matches!(results[0], Err(FrameError::InvalidLength(1))));
        assert_eq!(framer.state(), FramerState::Seeking);

        let results = framer.feed(&[0xFF, 0xFF, 0x01, 0xF0]);
        assert!(matches!(results[0], Err(FrameError::InvalidLength(0xF0))));
        assert_eq!(framer.state(), FramerState::Seeking);
    }

    #[test]
    fn byte_by_byte_states() {
        let frame = response(1, 0x00, &[0xAB]);
        let mut framer = StreamFramer::new();

        assert!(framer.push(frame[0]).is_none());
        assert_eq!(framer.state(), FramerState::Seeking);
        assert!(framer.push(frame[1]).is_none());
        assert_eq!(framer.state(), FramerState::Header);
        assert!(framer.push(frame[2]).is_none());
        assert!(framer.push(frame[3]).is_none());
        assert_eq!(framer.state(), FramerState::Body);
        assert!(framer.push(frame[4]).is_none());
        assert!(framer.push(frame[5]).is_none());
        let packet = framer.push(frame[6]).unwrap().unwrap();
        assert_eq!(packet.id(), 1);
        assert_eq!(framer.state(), FramerState::Seeking);
    }

    #[test]
    fn back_to_back_frames() {
        let mut stream = response(1, 0x00, &[]);
        stream.extend(response(2, 0x00, &[0x03, 0xFF]));
        stream.extend(response(3, 0x01, &[]));

        let mut framer = StreamFramer::new();
        let ids: Vec<u8> = framer
            .feed(&stream)
            .into_iter()
            .map(|r| r.unwrap().id())
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn reset_discards_partial_frame() {
        let frame = response(1, 0x00, &[0x01, 0x02]);
        let mut framer = StreamFramer::new();
        framer.feed(&frame[..5]);
        assert_eq!(framer.state(), FramerState::Body);

        framer.reset();
        assert_eq!(framer.state(), FramerState::Seeking);
        let packet = only_packet(framer.feed(&frame));
        assert_eq!(packet.id(), 1);
    }
}
