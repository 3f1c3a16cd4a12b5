//! Host-side control of SCS serial-bus servos.
//!
//! Many servos share one half-duplex serial line. This crate opens the line,
//! frames commands, routes each reply to the servo it came from and exposes
//! every servo as an async endpoint.
//!
//! # Crate Structure
//!
//! - [`transport`]: host serial ports
//! - [`frame`]: packet codec and byte-stream framer
//! - [`bus`]: shared bus, id registry and servo endpoints (behind `bus` feature)
//!
//! ```no_run
//! # async fn demo() -> scservo::bus::Result<()> {
//! use scservo::bus::{connect, Servo};
//! use scservo::transport::SerialConfig;
//!
//! let serial = connect(&SerialConfig::new("/dev/ttyUSB0"))?;
//! let servo = Servo::new(serial.bus(), 1)?;
//! servo.set_torque(true).await?;
//! servo.set_angle_in_time(100.0, 500).await?;
//! println!("now at {:.1} degrees", servo.read_status().await?);
//! # Ok(())
//! # }
//! ```

/// Re-export transport types.
pub mod transport {
    pub use scservo_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use scservo_frame::*;
}

/// Re-export bus types (requires `bus` feature).
#[cfg(feature = "bus")]
pub mod bus {
    pub use scservo_bus::*;
}
