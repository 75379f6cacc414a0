use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

use crate::channel::ChannelPath;
use crate::checksum::checksum;
use crate::cobs;
use crate::error::{FrameError, Result};
use crate::types::TypePath;

/// Integrity trailer size (checksum, low byte first).
pub const TRAILER_SIZE: usize = 2;

/// Smallest packet that can hold channel, type, and trailer.
pub const MIN_PACKET_SIZE: usize = 4;

/// Default cap on an unterminated stream accumulator: 1 MB.
pub const DEFAULT_MAX_PACKET: usize = 1_000_000;

/// A routed, typed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Hierarchical route, e.g. the anchor channel.
    pub channel: ChannelPath,
    /// Payload type.
    pub frame_type: TypePath,
    /// Opaque payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(channel: ChannelPath, frame_type: TypePath, payload: impl Into<Bytes>) -> Self {
        Self {
            channel,
            frame_type,
            payload: payload.into(),
        }
    }

    /// An HCI frame on `channel`.
    pub fn hci(channel: ChannelPath, payload: impl Into<Bytes>) -> Self {
        Self::new(channel, TypePath::hci(), payload)
    }

    /// Primary type code.
    pub fn type_code(&self) -> u8 {
        self.frame_type.primary()
    }

    /// Size of the de-stuffed packet (channel + type + payload + trailer).
    pub fn packet_size(&self) -> usize {
        self.channel.encoded_len() + self.frame_type.encoded_len() + self.payload.len() + TRAILER_SIZE
    }
}

/// Result of checking a packet's trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Integrity {
    Valid,
    Mismatch {
        /// Trailer value carried by the packet.
        received: u16,
        /// Value recomputed over channel, type, and payload.
        computed: u16,
    },
}

impl Integrity {
    pub fn is_valid(&self) -> bool {
        matches!(self, Integrity::Valid)
    }
}

/// A decoded frame together with its integrity verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub frame: Frame,
    pub integrity: Integrity,
}

/// What to do with frames whose trailer does not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrityPolicy {
    /// Log the mismatch and deliver the frame anyway.
    #[default]
    Lenient,
    /// Log the mismatch and discard the frame.
    Strict,
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Handling of checksum mismatches. Default: lenient.
    pub integrity: IntegrityPolicy,
    /// Accumulated bytes without a terminator beyond which the buffer is
    /// discarded. Default: 1 MB.
    pub max_packet_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            integrity: IntegrityPolicy::Lenient,
            max_packet_size: DEFAULT_MAX_PACKET,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

impl FrameConfig {
    pub fn strict() -> Self {
        Self {
            integrity: IntegrityPolicy::Strict,
            ..Self::default()
        }
    }
}

/// Encode a frame into its de-stuffed packet form.
///
/// Packet format:
/// ```text
/// ┌──────────────┬──────────────┬───────────┬──────────────────────┐
/// │ Channel path │ Type path    │ Payload   │ CRC-16 (2B, low 1st) │
/// │ (varint)     │ (varint)     │           │ over the first three │
/// └──────────────┴──────────────┴───────────┴──────────────────────┘
/// ```
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) {
    let start = dst.len();
    dst.reserve(frame.packet_size());
    frame.channel.encode(dst);
    frame.frame_type.encode(dst);
    dst.put_slice(&frame.payload);
    let crc = checksum(&dst[start..]);
    dst.put_u16_le(crc);
}

/// Encode and byte-stuff a frame, terminator included, ready for the wire.
pub fn encode_wire(frame: &Frame, dst: &mut BytesMut) {
    let mut packet = BytesMut::with_capacity(frame.packet_size());
    encode_frame(frame, &mut packet);
    cobs::stuff_into(&packet, dst);
}

/// Decode a de-stuffed packet.
///
/// A checksum mismatch does not fail decoding; it is reported through
/// [`DecodedFrame::integrity`] and the caller applies its policy.
pub fn decode_frame(packet: &[u8]) -> Result<DecodedFrame> {
    if packet.len() < MIN_PACKET_SIZE {
        return Err(FrameError::TooShort {
            len: packet.len(),
            min: MIN_PACKET_SIZE,
        });
    }

    let body_len = packet.len() - TRAILER_SIZE;
    let body = &packet[..body_len];

    let (channel, used) =
        ChannelPath::decode(body).map_err(|_| FrameError::Malformed("unterminated channel"))?;
    let (frame_type, type_len) = TypePath::decode(&body[used..])?;
    let payload = Bytes::copy_from_slice(&body[used + type_len..]);

    let received = u16::from_le_bytes([packet[body_len], packet[body_len + 1]]);
    let computed = checksum(body);
    let integrity = if received == computed {
        Integrity::Valid
    } else {
        Integrity::Mismatch { received, computed }
    };

    Ok(DecodedFrame {
        frame: Frame {
            channel,
            frame_type,
            payload,
        },
        integrity,
    })
}

/// Counters kept by a [`StreamDecoder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Frames handed to the caller.
    pub frames: u64,
    /// Frames whose trailer did not match (delivered or not).
    pub mismatches: u64,
    /// Packets thrown away: bad stuffing, too short, unsplittable,
    /// strict-mode mismatches, or overlong garbage.
    pub discarded: u64,
}

#[derive(Debug, Default)]
struct Counters {
    frames: AtomicU64,
    mismatches: AtomicU64,
    discarded: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DecoderStats {
        DecoderStats {
            frames: self.frames.load(Ordering::Relaxed),
            mismatches: self.mismatches.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Live view of a decoder's counters.
///
/// Stays valid after the decoder moves into a `FramedRead` or another task,
/// and sees packets that were discarded without ever producing a frame.
#[derive(Debug, Clone)]
pub struct DecoderStatsHandle(Arc<Counters>);

impl DecoderStatsHandle {
    pub fn snapshot(&self) -> DecoderStats {
        self.0.snapshot()
    }
}

/// Incremental decoder for a stuffed byte stream.
///
/// Bytes are appended to a caller-owned buffer; every call consumes complete
/// packets up to and including their terminator. Partial packets stay in the
/// buffer untouched, so arbitrary read chunking never loses bytes.
#[derive(Debug)]
pub struct StreamDecoder {
    config: FrameConfig,
    scanned: usize,
    stats: Arc<Counters>,
}

impl StreamDecoder {
    pub fn new(config: FrameConfig) -> Self {
        Self {
            config,
            scanned: 0,
            stats: Arc::default(),
        }
    }

    /// Pull the next deliverable frame out of `buf`, if one is complete.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Option<Frame> {
        loop {
            self.scanned = self.scanned.min(buf.len());
            let Some(offset) = buf[self.scanned..]
                .iter()
                .position(|b| *b == cobs::TERMINATOR)
            else {
                self.scanned = buf.len();
                if buf.len() > self.config.max_packet_size {
                    warn!(
                        len = buf.len(),
                        max = self.config.max_packet_size,
                        "discarding unterminated input"
                    );
                    buf.clear();
                    self.scanned = 0;
                    Counters::bump(&self.stats.discarded);
                }
                return None;
            };

            let stuffed = buf.split_to(self.scanned + offset + 1);
            self.scanned = 0;

            if let Some(frame) = self.accept_packet(&stuffed) {
                Counters::bump(&self.stats.frames);
                return Some(frame);
            }
        }
    }

    fn accept_packet(&mut self, stuffed: &[u8]) -> Option<Frame> {
        let packet = match cobs::unstuff(stuffed) {
            Ok(packet) if packet.len() >= MIN_PACKET_SIZE => packet,
            Ok(packet) => {
                warn!(packet = ?packet, raw = ?stuffed, "wrong cobs packet");
                Counters::bump(&self.stats.discarded);
                return None;
            }
            Err(err) => {
                warn!(error = %err, raw = ?stuffed, "wrong cobs packet");
                Counters::bump(&self.stats.discarded);
                return None;
            }
        };

        let decoded = match decode_frame(&packet) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(error = %err, packet = ?packet, "undecodable packet");
                Counters::bump(&self.stats.discarded);
                return None;
            }
        };

        if let Integrity::Mismatch { received, computed } = decoded.integrity {
            Counters::bump(&self.stats.mismatches);
            warn!(
                packet = ?packet,
                received = format_args!("{received:#06x}"),
                computed = format_args!("{computed:#06x}"),
                policy = ?self.config.integrity,
                "checksum mismatch"
            );
            if self.config.integrity == IntegrityPolicy::Strict {
                Counters::bump(&self.stats.discarded);
                return None;
            }
        } else {
            debug!(
                channel = %decoded.frame.channel,
                frame_type = %decoded.frame.frame_type,
                size = decoded.frame.payload.len(),
                "frame decoded"
            );
        }

        Some(decoded.frame)
    }

    /// Drop any partially accumulated packet state.
    pub fn reset(&mut self) {
        self.scanned = 0;
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats.snapshot()
    }

    /// Handle that keeps reporting this decoder's counters.
    pub fn stats_handle(&self) -> DecoderStatsHandle {
        DecoderStatsHandle(Arc::clone(&self.stats))
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

/// A clone starts from the same counts but keeps its own from then on.
impl Clone for StreamDecoder {
    fn clone(&self) -> Self {
        let snapshot = self.stats.snapshot();
        Self {
            config: self.config.clone(),
            scanned: self.scanned,
            stats: Arc::new(Counters {
                frames: AtomicU64::new(snapshot.frames),
                mismatches: AtomicU64::new(snapshot.mismatches),
                discarded: AtomicU64::new(snapshot.discarded),
            }),
        }
    }
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new(FrameConfig::default())
    }
}
