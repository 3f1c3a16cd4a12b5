use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use scservo_frame::StreamFramer;
use scservo_transport::SerialStream;

use crate::cmd::{BusOptions, MonitorArgs};
use crate::exit::{io_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_record, OutputFormat, PacketOutput};

pub fn run(args: MonitorArgs, format: OutputFormat, bus: &BusOptions) -> CliResult<i32> {
    let config = bus.serial_config()?;
    let mut stream =
        SerialStream::open(&config).map_err(|err| transport_error("cannot open port", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut framer = StreamFramer::new();
    let mut chunk = [0u8; 64];
    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let n = match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                continue
            }
            Err(err) => return Err(io_error("read failed", err)),
        };

        for outcome in framer.feed(&chunk[..n]) {
            print_record(&PacketOutput::new(&outcome), format);
            printed = printed.saturating_add(1);

            if let Some(count) = args.count {
                if printed >= count {
                    return Ok(SUCCESS);
                }
            }
        }
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
