use std::sync::Arc;

use tokio::sync::mpsc;
use tsb_frame::{ChannelPath, Frame};
use tsb_line::config::anchor_path;
use tsb_line::{AnchorSocket, BeaconLine, LineConfig, LineError};

use crate::cmd::{runtime, Context, LineArgs};
use crate::exit::{line_error, CliError, CliResult, SUCCESS};
use crate::output::{print_frame, print_notification};

pub fn run(args: LineArgs, ctx: &Context) -> CliResult<i32> {
    let config = LineConfig::new(&args.name, &args.addr, args.anchors)
        .with_frame_config(ctx.frame.clone())
        .with_types(Arc::new(ctx.types.clone()));
    config
        .validate()
        .map_err(|err| line_error("invalid line", err))?;

    runtime()?.block_on(async {
        let (note_tx, mut notes) = config.notification_channel();
        let line = BeaconLine::connect(config, note_tx)
            .await
            .map_err(|err| line_error("line connect failed", err))?;

        let (payload_tx, mut payloads) = mpsc::channel(64);
        let mut sockets = Vec::with_capacity(usize::from(line.anchors()));
        for id in 1..=line.anchors() {
            let path = anchor_path(id).map_err(|err| line_error("anchor open failed", err))?;
            let socket = Arc::new(
                AnchorSocket::open(&line, id)
                    .map_err(|err| line_error("anchor open failed", err))?,
            );
            tokio::spawn(read_anchor(Arc::clone(&socket), path, payload_tx.clone()));
            sockets.push(socket);
        }
        drop(payload_tx);

        let mut printed = 0usize;
        let shutdown = tsb_relay::shutdown_signal();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = line.closed() => break,
                Some(note) = notes.recv() => {
                    print_notification(&note, &ctx.types, ctx.format);
                }
                Some((anchor, frame)) = payloads.recv() => {
                    let source = format!("{}/anchor-{anchor:02}", line.name());
                    print_frame(&frame, &source, &ctx.types, ctx.format);
                }
            }
            printed = printed.saturating_add(1);
            if args.count.is_some_and(|count| printed >= count) {
                break;
            }
        }

        for socket in &sockets {
            let _ = socket.close().await;
        }
        let stats = line.stats();
        tracing::info!(
            line = %line.name(),
            received = stats.received,
            sent = stats.sent,
            dropped = stats.dropped,
            mismatches = stats.mismatches,
            "beacon line finished"
        );
        line.shutdown();
        Ok::<_, CliError>(SUCCESS)
    })
}

/// Forward every payload read from `socket` as an HCI frame on `path`.
async fn read_anchor(
    socket: Arc<AnchorSocket>,
    path: ChannelPath,
    out: mpsc::Sender<(u8, Frame)>,
) {
    let mut buf = vec![0u8; 1024];
    loop {
        match socket.read(&mut buf).await {
            Ok(n) => {
                let frame = Frame::hci(path.clone(), buf[..n].to_vec());
                if out.send((socket.id(), frame)).await.is_err() {
                    break;
                }
            }
            Err(LineError::Timeout(_)) => continue,
            Err(err) => {
                tracing::debug!(anchor = socket.id(), error = %err, "anchor reader stopped");
                break;
            }
        }
    }
}
