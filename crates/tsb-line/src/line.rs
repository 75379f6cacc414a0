use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tsb_frame::types::{ERROR, HCI};
use tsb_frame::{DecoderStatsHandle, Frame, TsbCodec};

use crate::config::{anchor_channel, anchor_of_channel, LineConfig};
use crate::error::{LineError, Result};
use crate::notification::Notification;

/// Upper bound on writing out already queued frames once the line shuts down.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Receiving half of one anchor's inbox, shared between the line and its sockets.
pub(crate) type InboxReceiver = Arc<AsyncMutex<mpsc::Receiver<Bytes>>>;

#[derive(Clone)]
struct Inbox {
    tx: mpsc::Sender<Bytes>,
    rx: InboxReceiver,
}

impl Inbox {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Arc::new(AsyncMutex::new(rx)),
        }
    }
}

/// Counters for one line, see [`BeaconLine::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineStats {
    /// Frames decoded from the connection.
    pub received: u64,
    /// Frames written to the connection.
    pub sent: u64,
    /// HCI payloads dropped because the anchor inbox was full.
    pub dropped: u64,
    /// HCI frames on a channel with no inbox.
    pub unroutable: u64,
    /// Notifications dropped because the sink was full or gone.
    pub notifications_dropped: u64,
    /// Frames whose trailer did not match.
    pub mismatches: u64,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    sent: AtomicU64,
    dropped: AtomicU64,
    unroutable: AtomicU64,
    notifications_dropped: AtomicU64,
}

struct LineInner {
    config: LineConfig,
    /// Keyed by channel byte.
    inboxes: Mutex<HashMap<u8, Inbox>>,
    send_tx: mpsc::Sender<Frame>,
    shutdown: CancellationToken,
    counters: Counters,
    decoder_stats: DecoderStatsHandle,
}

/// One tsb connection shared by a set of anchors.
///
/// HCI traffic is demultiplexed into a bounded inbox per anchor; `ERROR`
/// frames and anything else become [`Notification`]s. Cloning is cheap and
/// every clone drives the same connection.
#[derive(Clone)]
pub struct BeaconLine {
    inner: Arc<LineInner>,
}

impl BeaconLine {
    /// Dial `config.addr` and start the line.
    ///
    /// Fails immediately if the endpoint cannot be reached; there is no
    /// retry.
    pub async fn connect(
        config: LineConfig,
        notifications: mpsc::Sender<Notification>,
    ) -> Result<Self> {
        config.validate()?;
        let stream = tsb_transport::async_tcp::connect(&config.addr).await?;
        tracing::info!(line = %config.name, addr = %config.addr, "client connected");
        Self::from_stream(config, stream, notifications)
    }

    /// Start a line over an already connected stream.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_stream<S>(
        config: LineConfig,
        stream: S,
        notifications: mpsc::Sender<Notification>,
    ) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        config.validate()?;

        let inboxes = (1..=config.anchors)
            .map(|id| (anchor_channel(id), Inbox::new(config.inbox_capacity)))
            .collect();
        let (send_tx, send_rx) = mpsc::channel(config.send_queue);
        let codec = TsbCodec::new(config.frame.clone());

        let inner = Arc::new(LineInner {
            config,
            inboxes: Mutex::new(inboxes),
            send_tx,
            shutdown: CancellationToken::new(),
            counters: Counters::default(),
            decoder_stats: codec.stats_handle(),
        });

        let (reader, writer) = tokio::io::split(stream);
        tokio::spawn(receive_loop(Arc::clone(&inner), reader, codec, notifications));
        tokio::spawn(send_loop(Arc::clone(&inner), writer, send_rx));

        Ok(Self { inner })
    }

    /// Queue a frame for the send task, waiting while the queue is full.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(LineError::Disconnected);
        }
        tokio::select! {
            _ = self.inner.shutdown.cancelled() => Err(LineError::Disconnected),
            res = self.inner.send_tx.send(frame) => res.map_err(|_| LineError::Disconnected),
        }
    }

    /// Resolves once the connection has terminated.
    pub async fn closed(&self) {
        self.inner.shutdown.cancelled().await;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Stop accepting sends and end both connection tasks. Idempotent.
    ///
    /// Frames queued before the call are still written, for up to one
    /// second, before the connection is dropped.
    pub fn shutdown(&self) {
        if !self.inner.shutdown.is_cancelled() {
            tracing::info!(line = %self.inner.config.name, "shutting down beacon line");
        }
        self.inner.shutdown.cancel();
    }

    pub fn stats(&self) -> LineStats {
        let c = &self.inner.counters;
        LineStats {
            received: c.received.load(Ordering::Relaxed),
            sent: c.sent.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            unroutable: c.unroutable.load(Ordering::Relaxed),
            notifications_dropped: c.notifications_dropped.load(Ordering::Relaxed),
            mismatches: self.inner.decoder_stats.snapshot().mismatches,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Number of anchors configured on this line.
    pub fn anchors(&self) -> u8 {
        self.inner.config.anchors
    }

    /// Anchor ids that still have an inbox, ascending.
    pub fn registered_anchors(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = self
            .inner
            .inboxes()
            .keys()
            .map(|ch| anchor_of_channel(*ch))
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn config(&self) -> &LineConfig {
        &self.inner.config
    }

    pub(crate) fn inbox(&self, channel: u8) -> Option<InboxReceiver> {
        self.inner
            .inboxes()
            .get(&channel)
            .map(|inbox| Arc::clone(&inbox.rx))
    }

    pub(crate) fn retire_inbox(&self, channel: u8) {
        self.inner.inboxes().remove(&channel);
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.inner.shutdown
    }
}

impl std::fmt::Debug for BeaconLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeaconLine")
            .field("name", &self.inner.config.name)
            .field("addr", &self.inner.config.addr)
            .field("anchors", &self.inner.config.anchors)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl LineInner {
    fn inboxes(&self) -> MutexGuard<'_, HashMap<u8, Inbox>> {
        self.inboxes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn route(&self, frame: Frame, notifications: &mpsc::Sender<Notification>) {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        match frame.type_code() {
            HCI => self.deliver(frame),
            ERROR => self.notify(Notification::anchor_log(&frame), notifications),
            _ => self.notify(
                Notification::unexpected(frame, &self.config.types),
                notifications,
            ),
        }
    }

    fn deliver(&self, frame: Frame) {
        let tx = frame
            .channel
            .as_single()
            .and_then(|ch| self.inboxes().get(&ch).map(|inbox| inbox.tx.clone()));
        let Some(tx) = tx else {
            self.counters.unroutable.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(channel = %frame.channel, "no inbox for hci frame");
            return;
        };

        match tx.try_send(frame.payload) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(channel = %frame.channel, "anchor inbox full, payload dropped");
            }
            Err(TrySendError::Closed(_)) => {
                self.counters.unroutable.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn notify(&self, note: Notification, notifications: &mpsc::Sender<Notification>) {
        if let Err(err) = notifications.try_send(note) {
            self.counters
                .notifications_dropped
                .fetch_add(1, Ordering::Relaxed);
            let reason = match err {
                TrySendError::Full(_) => "sink full",
                TrySendError::Closed(_) => "sink closed",
            };
            tracing::warn!(line = %self.config.name, reason, "notification dropped");
        }
    }
}

async fn receive_loop<R>(
    inner: Arc<LineInner>,
    reader: R,
    codec: TsbCodec,
    notifications: mpsc::Sender<Notification>,
) where
    R: AsyncRead + Unpin,
{
    let mut frames = FramedRead::new(reader, codec);
    loop {
        let next = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            next = frames.next() => next,
        };
        match next {
            Some(Ok(frame)) => {
                tracing::debug!(
                    channel = %frame.channel,
                    frame_type = %frame.frame_type,
                    size = frame.payload.len(),
                    "frame received"
                );
                inner.route(frame, &notifications);
            }
            Some(Err(err)) => {
                tracing::warn!(line = %inner.config.name, error = %err, "receive failed");
                break;
            }
            None => break,
        }
    }
    tracing::info!(line = %inner.config.name, "client connection closed");
    inner.shutdown.cancel();
}

async fn send_loop<W>(inner: Arc<LineInner>, writer: W, mut queue: mpsc::Receiver<Frame>)
where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(writer, TsbCodec::new(inner.config.frame.clone()));
    loop {
        let frame = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            frame = queue.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        if let Err(err) = sink.send(frame).await {
            tracing::warn!(line = %inner.config.name, error = %err, "send failed");
            inner.shutdown.cancel();
            return;
        }
        inner.counters.sent.fetch_add(1, Ordering::Relaxed);
    }
    inner.shutdown.cancel();

    // Writes that were accepted before shutdown still go out.
    queue.close();
    let drain = async {
        while let Some(frame) = queue.recv().await {
            if let Err(err) = sink.send(frame).await {
                tracing::debug!(line = %inner.config.name, error = %err, "drain stopped");
                return;
            }
            inner.counters.sent.fetch_add(1, Ordering::Relaxed);
        }
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        tracing::warn!(
            line = %inner.config.name,
            pending = queue.len(),
            "send queue not drained before shutdown"
        );
    }
}
