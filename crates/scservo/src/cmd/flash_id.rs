use serde::Serialize;

use crate::cmd::{BusOptions, FlashIdArgs, Session};
use crate::exit::{bus_error, CliResult, SUCCESS};
use crate::output::{print_record, OutputFormat};

#[derive(Serialize)]
struct FlashIdOutput {
    old_id: u8,
    new_id: u8,
}

pub fn run(args: FlashIdArgs, format: OutputFormat, bus: &BusOptions) -> CliResult<i32> {
    let session = Session::open(bus)?;
    let mut servo = session.servo(args.id)?;

    session
        .block_on(servo.flash_id(args.new_id))
        .map_err(|err| bus_error("id change failed", err))?;
    tracing::info!(old_id = args.id, new_id = servo.id(), "servo id changed");
    drop(servo);
    session.close()?;

    print_record(
        &FlashIdOutput {
            old_id: args.id,
            new_id: args.new_id,
        },
        format,
    );
    Ok(SUCCESS)
}
