mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;
use tsb_frame::{FrameConfig, IntegrityPolicy, TypeRegistry};

use crate::cmd::{Command, Context};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "tsb", version, about = "tsb framed transport CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        env = "TSB_LOG_LEVEL",
        default_value = "info",
        global = true
    )]
    log_level: LogLevel,

    /// Drop frames whose integrity trailer does not match.
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn context(&self) -> Context {
        let frame = FrameConfig {
            integrity: if self.strict {
                IntegrityPolicy::Strict
            } else {
                IntegrityPolicy::Lenient
            },
            ..FrameConfig::default()
        };
        Context {
            format: self.format.unwrap_or_else(OutputFormat::default_for_stdout),
            frame,
            types: TypeRegistry::default(),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let ctx = cli.context();
    let result = cmd::run(cli.command, &ctx);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
