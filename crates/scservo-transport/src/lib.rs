//! Host serial-port transport for SCS servo buses.
//!
//! The protocol engine only needs a byte sink (`Write`) and a byte source
//! (`Read`). This crate provides both over a host UART via [`SerialStream`],
//! plus port enumeration for diagnostics.
//!
//! This is the lowest layer of scservo. The framing and bus layers accept any
//! `Read`/`Write` pair, so tests and alternative links can bypass it.

pub mod error;
pub mod serial;
pub mod stream;

pub use error::{Result, TransportError};
pub use serial::{available_ports, PortInfo, SerialConfig, DEFAULT_BAUD_RATE};
pub use stream::SerialStream;
