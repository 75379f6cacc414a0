use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tsb_frame::{ChannelPath, FrameConfig, TypeRegistry};

use crate::error::{LineError, Result};
use crate::notification::Notification;

/// Anchor `n` talks on channel `n * ANCHOR_CHANNEL_STRIDE + ANCHOR_CHANNEL_OFFSET`.
///
/// Fixed by the anchor firmware; changing it breaks wire compatibility.
pub const ANCHOR_CHANNEL_STRIDE: u8 = 5;
pub const ANCHOR_CHANNEL_OFFSET: u8 = 1;

/// Highest anchor id whose channel still fits in one path component.
pub const MAX_ANCHORS: u8 = 25;

/// Per-call wait of [`AnchorSocket::read`](crate::AnchorSocket::read).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_INBOX_CAPACITY: usize = 10;
pub const DEFAULT_SEND_QUEUE: usize = 100;
pub const DEFAULT_NOTIFY_QUEUE: usize = 100;

/// HCI `Read_Local_Version_Information`; harmless, and its reply wakes a
/// reader parked on the inbox.
pub const NOOP_COMMAND: [u8; 4] = [0x01, 0x09, 0x10, 0x00];

/// Channel byte for anchor `id`.
pub fn anchor_channel(id: u8) -> u8 {
    id * ANCHOR_CHANNEL_STRIDE + ANCHOR_CHANNEL_OFFSET
}

/// Channel path for anchor `id`.
pub fn anchor_path(id: u8) -> Result<ChannelPath> {
    if id == 0 || id > MAX_ANCHORS {
        return Err(LineError::UnknownAnchor(id));
    }
    Ok(ChannelPath::single(anchor_channel(id))?)
}

/// Anchor id reported for a channel byte (`6 -> 1`, `11 -> 2`).
pub fn anchor_of_channel(channel: u8) -> u8 {
    channel / ANCHOR_CHANNEL_STRIDE
}

/// Configuration for a [`BeaconLine`](crate::BeaconLine).
#[derive(Debug, Clone)]
pub struct LineConfig {
    /// Display name used in logs.
    pub name: String,
    /// `host:port` of the upstream tsb endpoint.
    pub addr: String,
    /// Number of anchors; ids `1..=anchors` get an inbox.
    pub anchors: u8,
    /// Payloads buffered per anchor before new ones are dropped.
    pub inbox_capacity: usize,
    /// Frames buffered for the sender task before writers wait.
    pub send_queue: usize,
    /// Suggested capacity for the notification sink, see [`LineConfig::notification_channel`].
    pub notify_queue: usize,
    /// Wait per anchor socket read.
    pub read_timeout: Duration,
    /// Codec settings (integrity policy, packet cap).
    pub frame: FrameConfig,
    /// Labels for diagnostics.
    pub types: Arc<TypeRegistry>,
}

impl LineConfig {
    pub fn new(name: impl Into<String>, addr: impl Into<String>, anchors: u8) -> Self {
        Self {
            name: name.into(),
            addr: addr.into(),
            anchors,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
            send_queue: DEFAULT_SEND_QUEUE,
            notify_queue: DEFAULT_NOTIFY_QUEUE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            frame: FrameConfig::default(),
            types: Arc::new(TypeRegistry::default()),
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity;
        self
    }

    pub fn with_send_queue(mut self, capacity: usize) -> Self {
        self.send_queue = capacity;
        self
    }

    pub fn with_notify_queue(mut self, capacity: usize) -> Self {
        self.notify_queue = capacity;
        self
    }

    pub fn with_frame_config(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_types(mut self, types: Arc<TypeRegistry>) -> Self {
        self.types = types;
        self
    }

    /// Bounded notification channel sized by `notify_queue`.
    pub fn notification_channel(&self) -> (mpsc::Sender<Notification>, mpsc::Receiver<Notification>) {
        mpsc::channel(self.notify_queue.max(1))
    }

    /// Reject values the line cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.anchors == 0 || self.anchors > MAX_ANCHORS {
            return Err(LineError::Config(format!(
                "anchors must be in 1..={MAX_ANCHORS}, got {}",
                self.anchors
            )));
        }
        if self.inbox_capacity == 0 {
            return Err(LineError::Config("inbox_capacity must be > 0".into()));
        }
        if self.send_queue == 0 {
            return Err(LineError::Config("send_queue must be > 0".into()));
        }
        if self.notify_queue == 0 {
            return Err(LineError::Config("notify_queue must be > 0".into()));
        }
        if self.read_timeout.is_zero() {
            return Err(LineError::Config("read_timeout must be > 0".into()));
        }
        Ok(())
    }
}
