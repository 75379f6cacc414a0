//! COBS-stuffed tsb frames with hierarchical channel and type addressing.
//!
//! This is the core value-add layer of tsb. Every frame on the wire is:
//! - a channel path and a type path, each a continuation-bit varint sequence
//! - an opaque payload
//! - a CRC-16 trailer, low byte first
//!
//! The whole packet is byte-stuffed so that `0x00` only ever appears as the
//! frame terminator, which keeps the stream self-synchronizing without a
//! length prefix.

pub mod channel;
pub mod checksum;
pub mod cobs;
pub mod codec;
pub mod error;
pub mod hex;
pub mod reader;
pub mod types;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

pub use channel::{bytes_to_channel, channel_to_bytes, ChannelPath};
pub use codec::{
    decode_frame, encode_frame, encode_wire, DecodedFrame, DecoderStats, DecoderStatsHandle, Frame,
    FrameConfig, Integrity, IntegrityPolicy, StreamDecoder, DEFAULT_MAX_PACKET, MIN_PACKET_SIZE,
    TRAILER_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use types::{TypePath, TypeRegistry};
pub use writer::FrameWriter;

#[cfg(feature = "async")]
pub use async_codec::TsbCodec;
