use scservo_bus::{decode_position, raw_to_degrees};
use serde::Serialize;

use crate::cmd::{BusOptions, ServoArgs, Session};
use crate::exit::{bus_error, CliResult, SUCCESS};
use crate::output::{print_record, OutputFormat};

#[derive(Serialize)]
struct ReadOutput {
    id: u8,
    raw: u16,
    degrees: f64,
}

pub fn run(args: ServoArgs, format: OutputFormat, bus: &BusOptions) -> CliResult<i32> {
    let session = Session::open(bus)?;
    let servo = session.servo(args.id)?;

    let raw = session
        .block_on(async {
            let data = servo.request_read_status().await?.wait().await?;
            decode_position(&data)
        })
        .map_err(|err| bus_error("position read failed", err))?;
    drop(servo);
    session.close()?;

    print_record(
        &ReadOutput {
            id: args.id,
            raw,
            degrees: raw_to_degrees(raw),
        },
        format,
    );
    Ok(SUCCESS)
}
