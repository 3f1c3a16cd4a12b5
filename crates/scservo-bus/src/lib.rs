//! Shared SCS servo bus.
//!
//! One [`Bus`] per physical line owns the transmit path, the inbound framer and
//! the id registration table. Each [`Servo`] registers its id on the bus and
//! talks to one device through async request/response calls that resolve on
//! the servo's reply or fail after the bus response timeout.

pub mod bus;
pub mod connector;
pub mod convert;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod pending;
pub mod servo;

pub use bus::{Bus, BusConfig, BusStats, InboundSink, ReaderHandle, DEFAULT_RESPONSE_TIMEOUT};
pub use connector::{connect, connect_with_config, SerialBus};
pub use convert::{
    decode_offset, decode_position, degrees_to_raw, encode_offset, raw_to_degrees, MAX_OFFSET,
};
pub use error::{BusError, Result};
pub use pending::PendingResponse;
pub use servo::Servo;
