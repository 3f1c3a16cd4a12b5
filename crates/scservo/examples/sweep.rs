//! Sweep one servo back and forth on a real bus.
//!
//! Run with:
//!   cargo run --example sweep -- /dev/ttyUSB0 1

use std::time::Duration;

use scservo::bus::{connect, Servo};
use scservo::transport::SerialConfig;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let port = args.next().unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    let id: u8 = args.next().map(|s| s.parse()).transpose()?.unwrap_or(1);

    let serial = connect(&SerialConfig::new(&port))?;
    let mut servo = Servo::new(serial.bus(), id)?;
    if let Err(err) = servo.load_settings().await {
        eprintln!("using zero offset, could not read settings: {err}");
    }
    servo.set_torque(true).await?;

    for target in [50.0, 150.0, 50.0, 150.0, 100.0] {
        servo.set_angle_in_time(target, 400).await?;
        tokio::time::sleep(Duration::from_millis(450)).await;
        eprintln!("target {target:>5.1}  present {:>5.1}", servo.read_status().await?);
    }

    servo.set_torque(false).await?;
    drop(servo);
    serial.close()?;
    Ok(())
}
