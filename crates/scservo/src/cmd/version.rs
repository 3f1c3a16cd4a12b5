use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("scservo {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: scservo");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("SCSERVO_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "features: bus={}, mock={}, cli=true",
        cfg!(feature = "bus"),
        cfg!(feature = "mock")
    );
    println!(
        "defaults: baud={}, response_timeout={:?}",
        scservo_transport::DEFAULT_BAUD_RATE,
        scservo_bus::DEFAULT_RESPONSE_TIMEOUT
    );

    Ok(SUCCESS)
}
