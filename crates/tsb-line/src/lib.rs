//! Beacon line: many anchors over one tsb connection.
//!
//! A [`BeaconLine`] owns the connection and routes HCI traffic to one
//! bounded inbox per anchor. [`AnchorSocket`] is the per-anchor virtual
//! device on top of it. Anchor log text and unexpected frame types are
//! surfaced as [`Notification`]s.

pub mod ble;
pub mod config;
pub mod error;
pub mod line;
pub mod notification;
pub mod socket;

pub use config::{
    anchor_channel, LineConfig, ANCHOR_CHANNEL_OFFSET, ANCHOR_CHANNEL_STRIDE,
    DEFAULT_INBOX_CAPACITY, DEFAULT_READ_TIMEOUT, MAX_ANCHORS, NOOP_COMMAND,
};
pub use error::{LineError, Result};
pub use line::{BeaconLine, LineStats};
pub use notification::Notification;
pub use socket::AnchorSocket;
