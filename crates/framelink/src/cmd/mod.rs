use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use framelink_session::{LinkConfig, LinkHandle, Presentation, SchedulerConfig};
use framelink_transport::{open_device, ByteSource, DeviceConfig, Transport, UnixDomainSocket};

use crate::exit::{transport_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod listen;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one message and wait until it is delivered.
    Send(SendArgs),
    /// Print received messages, acknowledging each one.
    Listen(ListenArgs),
    /// Bind a socket and echo every message back, like a remote device would.
    Serve(ServeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Serve(args) => serve::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct EndpointArgs {
    /// Serial device to open (e.g. /dev/rfcomm0).
    #[arg(long, env = "FRAMELINK_DEVICE", value_name = "PATH")]
    pub device: Option<PathBuf>,
    /// Unix socket to connect to.
    #[arg(long, env = "FRAMELINK_SOCKET", value_name = "PATH")]
    pub unix: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Time to wait for an acknowledgment before resending (e.g. 3s, 500ms).
    #[arg(long, env = "FRAMELINK_ACK_TIMEOUT", default_value = "3000ms")]
    pub ack_timeout: String,
    /// Resends after the first attempt before a message is abandoned.
    #[arg(
        long,
        env = "FRAMELINK_MAX_RETRIES",
        default_value_t = framelink_session::DEFAULT_MAX_RETRIES
    )]
    pub max_retries: u32,
    /// Dispatch heartbeat period.
    #[arg(long, env = "FRAMELINK_TICK", default_value = "50ms")]
    pub tick: String,
}

impl LinkArgs {
    pub fn to_config(&self) -> CliResult<LinkConfig> {
        Ok(LinkConfig {
            tick_interval: parse_duration(&self.tick)?,
            scheduler: SchedulerConfig {
                ack_timeout: parse_duration(&self.ack_timeout)?,
                max_retries: self.max_retries,
            },
            ..LinkConfig::default()
        })
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,
    #[command(flatten)]
    pub link: LinkArgs,
    /// Command byte (decimal or 0x-prefixed hex).
    #[arg(
        long,
        short = 'c',
        default_value = "0x02",
        value_parser = parse_command,
        conflicts_with = "legacy"
    )]
    pub command: u8,
    /// Send under the legacy command 0x00 with acknowledgment.
    #[arg(long, conflicts_with = "no_ack")]
    pub legacy: bool,
    /// Do not ask the peer for an acknowledgment.
    #[arg(long)]
    pub no_ack: bool,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Hex-encoded payload (e.g. 31 or 0a0b0c).
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
    /// Wait for one message from the peer after delivery and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for that message when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,
    #[command(flatten)]
    pub link: LinkArgs,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to bind.
    #[arg(env = "FRAMELINK_SOCKET")]
    pub path: PathBuf,
    #[command(flatten)]
    pub link: LinkArgs,
    /// Echo without asking the client for acknowledgments.
    #[arg(long)]
    pub no_ack: bool,
    /// Exit after the first client disconnects.
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Either endpoint, erased so both run on the same connection type.
pub struct Endpoint {
    pub transport: Box<dyn Transport>,
    pub source: Box<dyn ByteSource>,
    pub peer: String,
}

pub fn open_endpoint(args: &EndpointArgs) -> CliResult<Endpoint> {
    if let Some(path) = &args.device {
        let (transport, source) = open_device(path, &DeviceConfig::default())
            .map_err(|err| transport_error("open failed", err))?;
        return Ok(Endpoint {
            peer: transport.peer_name(),
            transport: Box::new(transport),
            source: Box::new(source),
        });
    }
    if let Some(path) = &args.unix {
        let (transport, source) =
            UnixDomainSocket::connect(path).map_err(|err| transport_error("connect failed", err))?;
        return Ok(Endpoint {
            peer: transport.peer_name(),
            transport: Box::new(transport),
            source: Box::new(source),
        });
    }
    Err(CliError::new(USAGE, "one of --device or --unix is required"))
}

/// Give queued frames (typically acknowledgments) a chance to go out
/// before the link is torn down.
pub fn wait_until_idle<T, P>(handle: &LinkHandle<T, P>, poll: Duration, timeout: Duration)
where
    T: Transport,
    P: Presentation,
{
    let deadline = Instant::now() + timeout;
    while handle.is_enabled() && Instant::now() < deadline {
        let stats = handle.stats();
        if stats.queued == 0 && !stats.awaiting_ack {
            return;
        }
        thread::sleep(poll);
    }
}

pub fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
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
        (input, "s")
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

pub fn parse_command(input: &str) -> Result<u8, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse::<u8>(),
    };
    parsed.map_err(|_| format!("invalid command byte: {input} (expected 0-255 or 0x00-0xff)"))
}

pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if !digits.is_ascii() {
        return Err(CliError::new(USAGE, format!("--hex is not valid hex: {input}")));
    }
    if digits.len() % 2 != 0 {
        return Err(CliError::new(USAGE, "--hex needs an even number of digits"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| CliError::new(USAGE, format!("--hex is not valid hex: {input}")))
        })
        .collect()
}
