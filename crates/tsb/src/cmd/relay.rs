use tsb_relay::{shutdown_signal, RelayConfig, RelayHandle, RelayServer};

use crate::cmd::{runtime, Context, RelayArgs};
use crate::exit::{relay_error, CliError, CliResult, SUCCESS};
use crate::output::print_frame;

pub fn run(args: RelayArgs, ctx: &Context) -> CliResult<i32> {
    let config = RelayConfig::new(args.bind)
        .with_client_queue(args.client_queue)
        .with_frame_config(ctx.frame.clone());

    runtime()?.block_on(async {
        let (server, handle) = RelayServer::bind(config)
            .await
            .map_err(|err| relay_error("relay bind failed", err))?;
        tracing::info!(
            addr = %server.local_addr(),
            loopback = args.loopback,
            "tsb relay started"
        );

        let pump = tokio::spawn(pump_inbound(handle, args.loopback, ctx.clone()));
        let result = server.run(shutdown_signal()).await;
        pump.abort();

        result.map_err(|err| relay_error("relay failed", err))?;
        tracing::info!("tsb relay terminates");
        Ok::<_, CliError>(SUCCESS)
    })
}

/// Print every inbound frame and, with loopback, hand it back for broadcast.
async fn pump_inbound(mut handle: RelayHandle, loopback: bool, ctx: Context) {
    while let Some(frame) = handle.inbound.recv().await {
        print_frame(&frame, "relay", &ctx.types, ctx.format);
        if loopback && handle.outbound.send(frame).await.is_err() {
            tracing::warn!("relay outbound queue closed");
            break;
        }
    }
}
