use serde::Serialize;

use crate::cmd::{BusOptions, OffsetCommand, Session};
use crate::exit::{bus_error, CliResult, SUCCESS};
use crate::output::{print_record, OutputFormat};

#[derive(Serialize)]
struct OffsetOutput {
    id: u8,
    offset: i16,
}

pub fn run(command: OffsetCommand, format: OutputFormat, bus: &BusOptions) -> CliResult<i32> {
    let session = Session::open(bus)?;

    let out = match command {
        OffsetCommand::Get(args) => {
            let mut servo = session.servo(args.id)?;
            let offset = session
                .block_on(servo.load_settings())
                .map_err(|err| bus_error("offset read failed", err))?;
            OffsetOutput {
                id: args.id,
                offset,
            }
        }
        OffsetCommand::Set(args) => {
            let mut servo = session.servo(args.id)?;
            session
                .block_on(servo.set_offset_angle(args.value))
                .map_err(|err| bus_error("offset write failed", err))?;
            OffsetOutput {
                id: args.id,
                offset: servo.offset(),
            }
        }
    };
    session.close()?;

    print_record(&out, format);
    Ok(SUCCESS)
}
