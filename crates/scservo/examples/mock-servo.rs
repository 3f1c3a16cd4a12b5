//! Drive two simulated servos without hardware.
//!
//! Run with:
//!   cargo run --example mock-servo --features mock

use scservo::bus::mock::MockBus;
use scservo::bus::Servo;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mock = MockBus::start();
    mock.add_servo(1);
    mock.add_servo(2);

    let mut left = Servo::new(&mock.bus, 1)?;
    let right = Servo::new(&mock.bus, 2)?;

    left.set_torque(true).await?;
    right.set_torque(true).await?;

    left.set_offset_angle(-12).await?;
    left.set_angle_in_time(100.0, 500).await?;
    right.set_angle(40.0).await?;

    eprintln!("left at {:.1} degrees", left.read_status().await?);
    eprintln!("right at {:.1} degrees", right.read_status().await?);

    left.flash_id(7).await?;
    eprintln!("left now answers on id {}", left.id());
    eprintln!("bus stats: {:?}", mock.bus.stats());

    Ok(())
}
