use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tsb_frame::codec::encode_wire;
use tsb_frame::{Frame, FrameConfig, TsbCodec};
use tsb_transport::TsbListener;

use crate::config::RelayConfig;
use crate::error::Result;
use crate::registry::{ConnectionId, ConnectionRegistry};

/// Pause between accept attempts after the listener reports an error.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Application side of a relay.
#[derive(Debug)]
pub struct RelayHandle {
    /// Frames decoded from any client, merged in arrival order.
    pub inbound: mpsc::Receiver<Frame>,
    /// Frames to broadcast to every client.
    pub outbound: mpsc::Sender<Frame>,
}

/// TCP server that broadcasts outbound frames to all clients and merges
/// what clients send into one inbound queue.
#[derive(Debug)]
pub struct RelayServer {
    config: RelayConfig,
    listener: TsbListener,
    registry: ConnectionRegistry,
    inbound_tx: mpsc::Sender<Frame>,
    outbound_rx: mpsc::Receiver<Frame>,
    shutdown: CancellationToken,
}

impl RelayServer {
    /// Bind the listener and create the application handle.
    ///
    /// Nothing is accepted until [`RelayServer::run`] is awaited.
    pub async fn bind(config: RelayConfig) -> Result<(Self, RelayHandle)> {
        config.validate()?;
        let listener = TsbListener::bind(&config.bind).await?;
        let (inbound_tx, inbound) = mpsc::channel(config.inbound_queue);
        let (outbound, outbound_rx) = mpsc::channel(config.outbound_queue);

        tracing::info!(addr = %listener.local_addr(), "tsb relay listening");

        let server = Self {
            config,
            listener,
            registry: ConnectionRegistry::new(),
            inbound_tx,
            outbound_rx,
            shutdown: CancellationToken::new(),
        };
        Ok((server, RelayHandle { inbound, outbound }))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Handle on the live client set.
    pub fn registry(&self) -> ConnectionRegistry {
        self.registry.clone()
    }

    /// Accept and serve clients until `shutdown` resolves.
    ///
    /// Every connection task is cancelled before this returns.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Self {
            config,
            listener,
            registry,
            inbound_tx,
            outbound_rx,
            shutdown: token,
        } = self;

        let dispatch = tokio::spawn(dispatch_loop(
            registry.clone(),
            outbound_rx,
            config.frame.clone(),
            token.clone(),
        ));
        let mut clients: Vec<JoinHandle<()>> = Vec::new();

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        clients.retain(|task| !task.is_finished());
                        clients.push(spawn_client(
                            stream,
                            peer,
                            &config,
                            &registry,
                            &inbound_tx,
                            &token,
                        ));
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "accept failed");
                        if !accept_backoff(&mut shutdown).await {
                            break;
                        }
                    }
                },
            }
        }

        tracing::info!(clients = registry.len(), "tsb relay shutting down");
        token.cancel();
        let _ = dispatch.await;
        for task in clients {
            let _ = task.await;
        }
        Ok(())
    }
}

/// Wait out [`ACCEPT_BACKOFF`]; `false` if `shutdown` resolved first.
async fn accept_backoff<S>(shutdown: &mut S) -> bool
where
    S: Future<Output = ()> + Unpin,
{
    tokio::select! {
        _ = shutdown => false,
        _ = tokio::time::sleep(ACCEPT_BACKOFF) => true,
    }
}

fn spawn_client(
    stream: TcpStream,
    peer: SocketAddr,
    config: &RelayConfig,
    registry: &ConnectionRegistry,
    inbound: &mpsc::Sender<Frame>,
    shutdown: &CancellationToken,
) -> JoinHandle<()> {
    let (tx, rx) = mpsc::channel(config.client_queue);
    let id = registry.register(peer, tx);
    tracing::info!(id, %peer, "client connected");

    let (read_half, write_half) = stream.into_split();
    let token = shutdown.child_token();

    let writer = tokio::spawn(client_writer(
        id,
        write_half,
        rx,
        registry.clone(),
        token.clone(),
    ));
    let reader = client_reader(
        id,
        read_half,
        config.frame.clone(),
        inbound.clone(),
        registry.clone(),
        token,
    );

    tokio::spawn(async move {
        reader.await;
        let _ = writer.await;
    })
}

async fn client_reader(
    id: ConnectionId,
    read_half: OwnedReadHalf,
    frame_config: FrameConfig,
    inbound: mpsc::Sender<Frame>,
    registry: ConnectionRegistry,
    token: CancellationToken,
) {
    let mut frames = FramedRead::new(read_half, TsbCodec::new(frame_config));
    loop {
        let next = tokio::select! {
            _ = token.cancelled() => break,
            next = frames.next() => next,
        };
        let frame = match next {
            Some(Ok(frame)) => frame,
            Some(Err(err)) => {
                tracing::warn!(id, error = %err, "client read failed");
                break;
            }
            None => {
                tracing::debug!(id, "client closed connection");
                break;
            }
        };
        tracing::debug!(
            id,
            channel = %frame.channel,
            frame_type = %frame.frame_type,
            size = frame.payload.len(),
            "frame received"
        );
        tokio::select! {
            _ = token.cancelled() => break,
            res = inbound.send(frame) => {
                if res.is_err() {
                    tracing::trace!(id, "inbound receiver gone, frame discarded");
                }
            }
        }
    }
    registry.deregister(id);
    token.cancel();
}

async fn client_writer(
    id: ConnectionId,
    mut write_half: OwnedWriteHalf,
    mut queue: mpsc::Receiver<Bytes>,
    registry: ConnectionRegistry,
    token: CancellationToken,
) {
    loop {
        let packet = tokio::select! {
            _ = token.cancelled() => break,
            packet = queue.recv() => match packet {
                Some(packet) => packet,
                None => break,
            },
        };
        tokio::select! {
            _ = token.cancelled() => break,
            res = write_half.write_all(&packet) => {
                if let Err(err) = res {
                    tracing::warn!(id, error = %err, "client write failed");
                    break;
                }
            }
        }
    }
    registry.deregister(id);
    token.cancel();
    let _ = write_half.shutdown().await;
}

async fn dispatch_loop(
    registry: ConnectionRegistry,
    mut outbound: mpsc::Receiver<Frame>,
    frame_config: FrameConfig,
    token: CancellationToken,
) {
    let mut buf = BytesMut::with_capacity(frame_config.max_packet_size.min(64 * 1024));
    loop {
        let frame = tokio::select! {
            _ = token.cancelled() => break,
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        encode_wire(&frame, &mut buf);
        let packet = buf.split().freeze();
        let report = registry.broadcast(&packet);
        tracing::debug!(
            channel = %frame.channel,
            frame_type = %frame.frame_type,
            delivered = report.delivered,
            dropped = report.dropped,
            "frame broadcast"
        );
    }
}
