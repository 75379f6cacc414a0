use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{
    encode_wire, DecoderStats, DecoderStatsHandle, Frame, FrameConfig, StreamDecoder,
};
use crate::error::FrameError;

/// `tokio_util` codec for tsb streams.
///
/// Use with `FramedRead`/`FramedWrite` over any `AsyncRead`/`AsyncWrite`.
/// Malformed packets are skipped inside [`Decoder::decode`] so a bad packet
/// never ends the frame stream; only I/O errors do.
#[derive(Debug, Clone, Default)]
pub struct TsbCodec {
    decoder: StreamDecoder,
}

impl TsbCodec {
    pub fn new(config: FrameConfig) -> Self {
        Self {
            decoder: StreamDecoder::new(config),
        }
    }

    /// Decoder counters so far.
    pub fn stats(&self) -> DecoderStats {
        self.decoder.stats()
    }

    /// Counters that stay readable once the codec is owned by a `FramedRead`.
    pub fn stats_handle(&self) -> DecoderStatsHandle {
        self.decoder.stats_handle()
    }
}

impl Decoder for TsbCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.decoder.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decoder.decode(src) {
            return Ok(Some(frame));
        }
        if !src.is_empty() {
            tracing::debug!(len = src.len(), "dropping partial packet at eof");
            src.clear();
            self.decoder.reset();
        }
        Ok(None)
    }
}

impl Encoder<Frame> for TsbCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_wire(&item, dst);
        Ok(())
    }
}

impl Encoder<&Frame> for TsbCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_wire(item, dst);
        Ok(())
    }
}
