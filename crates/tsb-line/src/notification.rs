use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use tsb_frame::{hex, Frame, TypeRegistry};

use crate::config::anchor_of_channel;

/// A non-HCI frame surfaced by the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Error/status text from an anchor (`ERROR` type).
    AnchorLog {
        anchor: u8,
        text: String,
        at_ms: u128,
    },
    /// Any other type; carried raw for diagnostics.
    Unexpected {
        frame: Frame,
        type_label: Option<String>,
        at_ms: u128,
    },
}

impl Notification {
    pub(crate) fn anchor_log(frame: &Frame) -> Self {
        Self::AnchorLog {
            anchor: anchor_of_channel(frame.channel.first_wire_byte()),
            text: String::from_utf8_lossy(&frame.payload).into_owned(),
            at_ms: unix_millis(),
        }
    }

    pub(crate) fn unexpected(frame: Frame, types: &TypeRegistry) -> Self {
        let type_label = types.label(frame.type_code()).map(str::to_string);
        Self::Unexpected {
            frame,
            type_label,
            at_ms: unix_millis(),
        }
    }

    /// Milliseconds since the Unix epoch when the frame was routed.
    pub fn at_ms(&self) -> u128 {
        match self {
            Self::AnchorLog { at_ms, .. } | Self::Unexpected { at_ms, .. } => *at_ms,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AnchorLog {
                anchor,
                text,
                at_ms,
            } => write!(f, "{at_ms}: Anchor: {anchor:2} says: {text}"),
            Self::Unexpected {
                frame,
                type_label,
                at_ms,
            } => {
                write!(
                    f,
                    "{at_ms}: Unexpected tsb-packet: ch: {}, typ: {}",
                    hex::encode(&frame.channel.to_bytes(), ""),
                    hex::encode(frame.frame_type.codes(), "")
                )?;
                if let Some(label) = type_label {
                    write!(f, " ({label})")?;
                }
                write!(f, " payload: {}", hex::encode(&frame.payload, " "))
            }
        }
    }
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
