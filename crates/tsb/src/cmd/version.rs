use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("tsb {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: tsb");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("TSB_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "features: line={}, relay={}, async={}, cli=true",
        cfg!(feature = "line"),
        cfg!(feature = "relay"),
        cfg!(feature = "async")
    );
    println!(
        "wire: cobs + crc16/ccitt-false trailer, max packet {} bytes",
        tsb_frame::codec::DEFAULT_MAX_PACKET
    );

    Ok(SUCCESS)
}
