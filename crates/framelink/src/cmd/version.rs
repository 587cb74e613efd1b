use framelink_frame::MAX_PAYLOAD;
use framelink_session::{DEFAULT_ACK_TIMEOUT, DEFAULT_MAX_RETRIES};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("framelink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: framelink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "build_target: {}",
        option_env!("FRAMELINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "protocol: max_payload={MAX_PAYLOAD}, ack_timeout={}ms, max_retries={DEFAULT_MAX_RETRIES}",
        DEFAULT_ACK_TIMEOUT.as_millis()
    );
    println!("features: session={}, cli=true", cfg!(feature = "session"));

    Ok(SUCCESS)
}
