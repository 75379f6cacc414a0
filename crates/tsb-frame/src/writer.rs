use std::io::{ErrorKind, Write};
use std::net::TcpStream;

use bytes::BytesMut;

use crate::channel::ChannelPath;
use crate::codec::{encode_wire, Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::types::TypePath;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes stuffed frames to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Write a complete frame (blocking).
    ///
    /// A write timeout surfaces as [`FrameError::Io`] with `WouldBlock` or
    /// `TimedOut`; part of the frame may already be on the wire by then.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.buf.clear();
        encode_wire(frame, &mut self.buf);

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        tracing::debug!(
            channel = %frame.channel,
            frame_type = %frame.frame_type,
            size = frame.payload.len(),
            "frame written"
        );

        self.flush()
    }

    /// Build and send a frame from its parts.
    pub fn send(&mut self, channel: ChannelPath, frame_type: TypePath, payload: &[u8]) -> Result<()> {
        let frame = Frame::new(channel, frame_type, payload.to_vec());
        self.write_frame(&frame)
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameWriter<TcpStream> {
    /// Create a frame writer for a TCP stream and apply the write timeout from config.
    pub fn with_config_tcp(inner: TcpStream, config: FrameConfig) -> Result<Self> {
        inner.set_write_timeout(config.write_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::cobs;
    use crate::codec::decode_frame;
    use crate::types::{ERROR, HCI};

    fn written(writer: FrameWriter<Cursor<Vec<u8>>>) -> Vec<u8> {
        writer.into_inner().into_inner()
    }

    #[test]
    fn write_single_frame() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer
            .send(ChannelPath::single(6).unwrap(), TypePath::hci(), b"hello")
            .unwrap();

        let wire = written(writer);
        assert_eq!(wire.last(), Some(&0x00));
        let decoded = decode_frame(&cobs::unstuff(&wire).unwrap()).unwrap();
        assert!(decoded.integrity.is_valid());
        assert_eq!(decoded.frame.channel.as_single(), Some(6));
        assert_eq!(decoded.frame.type_code(), HCI);
        assert_eq!(decoded.frame.payload.as_ref(), b"hello");
    }

    #[test]
    fn written_bytes_decode_in_order() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        let frames = [
            Frame::hci(ChannelPath::single(6).unwrap(), &b"one"[..]),
            Frame::new(
                "1.2".parse().unwrap(),
                TypePath::code(ERROR).unwrap(),
                &b"two"[..],
            ),
        ];
        for f in &frames {
            writer.write_frame(f).unwrap();
        }

        let mut reader = crate::reader::FrameReader::new(Cursor::new(written(writer)));
        for expected in &frames {
            assert_eq!(&reader.read_frame().unwrap(), expected);
        }
    }

    #[test]
    fn zero_bytes_in_payload_never_reach_the_wire_unstuffed() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer
            .send(ChannelPath::root(), TypePath::hci(), &[0, 0, 0, 1, 0])
            .unwrap();
        let wire = written(writer);
        assert_eq!(wire.iter().filter(|b| **b == 0).count(), 1);
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = FrameWriter::new(sink);

        writer
            .send(ChannelPath::root(), TypePath::hci(), b"x")
            .unwrap();

        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn handles_interrupted_write_and_flush() {
        let writer_impl = InterruptedWriteThenFlush {
            wrote_once: false,
            flush_interrupted: false,
            data: Vec::new(),
        };

        let mut writer = FrameWriter::new(writer_impl);
        writer
            .send(ChannelPath::root(), TypePath::hci(), b"retry")
            .unwrap();

        assert!(!writer.into_inner().data.is_empty());
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer
            .send(ChannelPath::root(), TypePath::hci(), b"x")
            .unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn would_block_propagates_io_error() {
        let mut writer = FrameWriter::new(WouldBlockWriter);
        let err = writer
            .send(ChannelPath::root(), TypePath::hci(), b"x")
            .unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));
    }

    #[test]
    fn applies_write_timeout_for_tcp_stream() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let stream = TcpStream::connect(addr).unwrap();
        // Accepted but never read, so the send buffer fills up.
        let (_peer, _) = listener.accept().unwrap();

        let cfg = FrameConfig {
            write_timeout: Some(std::time::Duration::from_millis(100)),
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config_tcp(stream, cfg).unwrap();
        let big = Frame::hci(ChannelPath::single(6).unwrap(), vec![0x55u8; 64 * 1024 * 1024]);

        let started = std::time::Instant::now();
        let err = writer.write_frame(&big).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Io(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
        ));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    struct WouldBlockWriter;

    impl Write for WouldBlockWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct InterruptedWriteThenFlush {
        wrote_once: bool,
        flush_interrupted: bool,
        data: Vec<u8>,
    }

    impl Write for InterruptedWriteThenFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.wrote_once {
                self.wrote_once = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flush_interrupted {
                self.flush_interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
