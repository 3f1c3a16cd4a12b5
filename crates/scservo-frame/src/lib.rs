//! SCS servo packet codec and byte-stream framer.
//!
//! This is the core value-add layer of scservo. Every packet on the bus is
//! framed as:
//! - A 2-byte preamble (`0xFF 0xFF`) for stream synchronization
//! - A 1-byte device id and a 1-byte length (bytes that follow it)
//! - A command byte, a register address, parameters
//! - A 1-byte complemented-sum checksum
//!
//! [`StreamFramer`] rebuilds packets from an unbounded byte stream one byte at
//! a time; [`FrameWriter`] encodes and writes outgoing commands.

pub mod codec;
pub mod error;
pub mod framer;
pub mod register;
pub mod writer;

pub use codec::{
    checksum, decode_frame, encode_frame, encode_response, Command, Frame, BROADCAST_ID, HEADER_SIZE,
    MAX_FRAME_SIZE, MAX_ID, MAX_PARAMS, PREAMBLE,
};
pub use error::{FrameError, Result};
pub use framer::{FramerState, Packet, StreamFramer};
pub use register::register_name;
pub use writer::FrameWriter;
