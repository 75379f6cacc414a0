use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tsb_frame::{ChannelPath, FrameConfig, FrameError, FrameReader};
use tsb_transport::TcpTransport;

use crate::cmd::{Context, MonitorArgs};
use crate::exit::{frame_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::print_frame;

/// How often a blocked read wakes up to check for Ctrl-C.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub fn run(args: MonitorArgs, ctx: &Context) -> CliResult<i32> {
    let filter = parse_filter(args.channels.as_deref())?;

    let stream = TcpTransport::connect(&args.addr)
        .map_err(|err| transport_error("connect failed", err))?;
    let config = FrameConfig {
        read_timeout: Some(POLL_INTERVAL),
        ..ctx.frame.clone()
    };
    let mut reader = FrameReader::with_config_tcp(stream, config)
        .map_err(|err| frame_error("connect failed", err))?;
    tracing::info!(addr = %args.addr, "monitoring");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(Arc::clone(&running))?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(FrameError::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                continue;
            }
            Err(FrameError::ConnectionClosed) => {
                tracing::info!(addr = %args.addr, "peer closed connection");
                break;
            }
            Err(err) => return Err(frame_error("receive failed", err)),
        };

        if let Some(channels) = &filter {
            if !channels.contains(&frame.channel) {
                continue;
            }
        }

        print_frame(&frame, &args.addr, &ctx.types, ctx.format);
        printed = printed.saturating_add(1);

        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    let stats = reader.stats();
    tracing::debug!(
        frames = stats.frames,
        mismatches = stats.mismatches,
        discarded = stats.discarded,
        "monitor finished"
    );
    Ok(SUCCESS)
}

fn parse_filter(channels: Option<&[String]>) -> CliResult<Option<Vec<ChannelPath>>> {
    channels
        .map(|list| {
            list.iter()
                .map(|c| c.parse().map_err(|err| frame_error("invalid --channels", err)))
                .collect()
        })
        .transpose()
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
