use std::future::Future;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use scservo_bus::{connect_with_config, BusConfig, SerialBus, Servo};
use scservo_transport::{SerialConfig, DEFAULT_BAUD_RATE};
use tokio::runtime::Runtime;

use crate::exit::{bus_error, io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod flash_id;
pub mod monitor;
pub mod move_to;
pub mod offset;
pub mod ports;
pub mod read;
pub mod torque;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List serial ports on this host.
    Ports,
    /// Enable or disable holding torque.
    Torque(TorqueArgs),
    /// Move a servo to an angle (0 to 200 degrees).
    Move(MoveArgs),
    /// Read a servo's present position.
    Read(ServoArgs),
    /// Give a servo a new id (stored in EEPROM).
    FlashId(FlashIdArgs),
    /// Read or store the calibration offset.
    #[command(subcommand)]
    Offset(OffsetCommand),
    /// Print every frame seen on the bus.
    Monitor(MonitorArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat, bus: &BusOptions) -> CliResult<i32> {
    match command {
        Command::Ports => ports::run(format),
        Command::Torque(args) => torque::run(args, format, bus),
        Command::Move(args) => move_to::run(args, format, bus),
        Command::Read(args) => read::run(args, format, bus),
        Command::FlashId(args) => flash_id::run(args, format, bus),
        Command::Offset(command) => offset::run(command, format, bus),
        Command::Monitor(args) => monitor::run(args, format, bus),
        Command::Version(args) => version::run(args),
    }
}

/// Serial line settings shared by every bus command.
#[derive(Args, Debug, Clone)]
pub struct BusOptions {
    /// Serial port the servo bus is attached to.
    #[arg(long, short = 'p', env = "SCSERVO_PORT", global = true)]
    pub port: Option<String>,
    /// Line speed in bits per second.
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE, global = true)]
    pub baud: u32,
    /// How long to wait for each servo reply (e.g. 40ms, 1s).
    #[arg(long, default_value = "40ms", value_parser = parse_duration, global = true)]
    pub timeout: Duration,
}

impl BusOptions {
    pub fn serial_config(&self) -> CliResult<SerialConfig> {
        let port = self.port.as_deref().ok_or_else(|| {
            CliError::new(USAGE, "no serial port given (use --port or SCSERVO_PORT)")
        })?;
        Ok(SerialConfig::new(port).with_baud_rate(self.baud))
    }
}

#[derive(Args, Debug)]
pub struct ServoArgs {
    /// Servo id.
    pub id: u8,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

#[derive(Args, Debug)]
pub struct TorqueArgs {
    /// Servo id.
    pub id: u8,
    /// Torque state.
    pub state: Switch,
}

#[derive(Args, Debug)]
pub struct MoveArgs {
    /// Servo id.
    pub id: u8,
    /// Target angle in degrees.
    #[arg(allow_hyphen_values = true)]
    pub degrees: f64,
    /// Arrive after this many milliseconds instead of at full speed.
    #[arg(long, value_name = "MS")]
    pub time: Option<u16>,
    /// Calibration offset added to the target, in degrees.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub offset: i16,
}

#[derive(Args, Debug)]
pub struct FlashIdArgs {
    /// Current servo id.
    pub id: u8,
    /// Id to assign.
    pub new_id: u8,
}

#[derive(Subcommand, Debug)]
pub enum OffsetCommand {
    /// Read the offset stored on the servo.
    Get(ServoArgs),
    /// Store a new offset on the servo (-2000 to 2000).
    Set(OffsetSetArgs),
}

#[derive(Args, Debug)]
pub struct OffsetSetArgs {
    /// Servo id.
    pub id: u8,
    /// Offset in degrees.
    #[arg(allow_hyphen_values = true)]
    pub value: i16,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Exit after printing N frames.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// An open bus plus the runtime that drives servo requests on it.
pub struct Session {
    runtime: Runtime,
    serial: SerialBus,
}

impl Session {
    pub fn open(options: &BusOptions) -> CliResult<Self> {
        let serial_config = options.serial_config()?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|err| io_error("runtime setup failed", err))?;
        let config = BusConfig {
            response_timeout: options.timeout,
        };
        let serial = connect_with_config(&serial_config, config)
            .map_err(|err| bus_error(&format!("cannot open {}", serial_config.port), err))?;
        Ok(Self { runtime, serial })
    }

    pub fn servo(&self, id: u8) -> CliResult<Servo> {
        Servo::new(self.serial.bus(), id).map_err(|err| bus_error("invalid servo", err))
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    pub fn close(self) -> CliResult<()> {
        self.serial
            .close()
            .map_err(|err| bus_error("closing bus failed", err))
    }
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "ms")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
