use scservo_bus::degrees_to_raw;
use serde::Serialize;

use crate::cmd::{BusOptions, MoveArgs, Session};
use crate::exit::{bus_error, CliResult, SUCCESS};
use crate::output::{print_record, OutputFormat};

#[derive(Serialize)]
struct MoveOutput {
    id: u8,
    degrees: f64,
    offset: i16,
    raw_goal: u16,
    time_ms: Option<u16>,
}

pub fn run(args: MoveArgs, format: OutputFormat, bus: &BusOptions) -> CliResult<i32> {
    let session = Session::open(bus)?;
    let mut servo = session.servo(args.id)?;
    servo
        .set_offset(args.offset)
        .map_err(|err| bus_error("invalid offset", err))?;

    let result = match args.time {
        Some(ms) => session.block_on(servo.set_angle_in_time(args.degrees, ms)),
        None => session.block_on(servo.set_angle(args.degrees)),
    };
    result.map_err(|err| bus_error("move failed", err))?;
    drop(servo);
    session.close()?;

    print_record(
        &MoveOutput {
            id: args.id,
            degrees: args.degrees,
            offset: args.offset,
            raw_goal: degrees_to_raw(args.degrees + f64::from(args.offset)),
            time_ms: args.time,
        },
        format,
    );
    Ok(SUCCESS)
}
