use serde::Serialize;

use crate::cmd::{BusOptions, Session, Switch, TorqueArgs};
use crate::exit::{bus_error, CliResult, SUCCESS};
use crate::output::{print_record, OutputFormat};

#[derive(Serialize)]
struct TorqueOutput {
    id: u8,
    torque: &'static str,
}

pub fn run(args: TorqueArgs, format: OutputFormat, bus: &BusOptions) -> CliResult<i32> {
    let session = Session::open(bus)?;
    let servo = session.servo(args.id)?;
    let enabled = args.state == Switch::On;

    session
        .block_on(servo.set_torque(enabled))
        .map_err(|err| bus_error("torque write failed", err))?;
    drop(servo);
    session.close()?;

    print_record(
        &TorqueOutput {
            id: args.id,
            torque: if enabled { "on" } else { "off" },
        },
        format,
    );
    Ok(SUCCESS)
}
