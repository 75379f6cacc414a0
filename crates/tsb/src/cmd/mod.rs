use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use tsb_frame::{FrameConfig, TypeRegistry};

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod line;
pub mod monitor;
pub mod relay;
pub mod send;
pub mod types;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a broadcast relay server.
    Relay(RelayArgs),
    /// Send a single frame.
    Send(SendArgs),
    /// Connect and print decoded frames.
    Monitor(MonitorArgs),
    /// Open a beacon line and print what its anchors report.
    Line(LineArgs),
    /// List the known frame type codes.
    Types(TypesArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    pub format: OutputFormat,
    pub frame: FrameConfig,
    pub types: TypeRegistry,
}

pub fn run(command: Command, ctx: &Context) -> CliResult<i32> {
    match command {
        Command::Relay(args) => relay::run(args, ctx),
        Command::Send(args) => send::run(args, ctx),
        Command::Monitor(args) => monitor::run(args, ctx),
        Command::Line(args) => line::run(args, ctx),
        Command::Types(args) => types::run(args, ctx),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct RelayArgs {
    /// Listen address.
    #[arg(long, default_value = tsb_relay::config::DEFAULT_BIND)]
    pub bind: String,
    /// Rebroadcast every inbound frame to all clients.
    #[arg(long)]
    pub loopback: bool,
    /// Per-client queue length before frames are dropped for that client.
    #[arg(long, default_value_t = tsb_relay::config::DEFAULT_CLIENT_QUEUE)]
    pub client_queue: usize,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Address to connect to (host:port).
    pub addr: String,
    /// Channel path, dotted (e.g. 6 or 3.4).
    #[arg(long, short = 'c')]
    pub channel: String,
    /// Frame type: a registry label (hci, error, ...) or a code (0x15, 21).
    #[arg(long = "type", short = 't', default_value = "hci")]
    pub frame_type: String,
    /// Text payload.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Hex payload (spaces allowed).
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
    /// Wait for one frame back and print it.
    #[arg(long)]
    pub wait: bool,
    /// Connect and --wait timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Address to connect to (host:port).
    pub addr: String,
    /// Only print frames on these channels (comma-separated dotted paths).
    #[arg(long, value_delimiter = ',')]
    pub channels: Option<Vec<String>>,
    /// Exit after printing N frames.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct LineArgs {
    /// Address of the tsb endpoint (host:port).
    pub addr: String,
    /// Number of anchors on the line.
    #[arg(long)]
    pub anchors: u8,
    /// Line name used in logs.
    #[arg(long, default_value = "bline")]
    pub name: String,
    /// Exit after N payloads and notifications.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug, Default)]
pub struct TypesArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(num) => (num, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Multi-threaded runtime for the async commands.
pub(crate) fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))
}
