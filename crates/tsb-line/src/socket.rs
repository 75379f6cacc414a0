use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tsb_frame::Frame;

use crate::config::{anchor_path, NOOP_COMMAND};
use crate::error::{LineError, Result};
use crate::line::{BeaconLine, InboxReceiver};

/// Virtual HCI device for one anchor on a [`BeaconLine`].
///
/// Reads and writes are message oriented: one `read` returns at most one
/// payload, one `write` sends exactly one frame.
pub struct AnchorSocket {
    line: BeaconLine,
    id: u8,
    channel: u8,
    inbox: InboxReceiver,
    write_lock: AsyncMutex<()>,
    closed: CancellationToken,
}

impl AnchorSocket {
    /// Open the socket for anchor `id` (`1..=line.anchors()`).
    pub fn open(line: &BeaconLine, id: u8) -> Result<Self> {
        if id == 0 || id > line.anchors() {
            return Err(LineError::UnknownAnchor(id));
        }
        let channel = anchor_path(id)?
            .as_single()
            .ok_or(LineError::UnknownAnchor(id))?;
        let inbox = line.inbox(channel).ok_or(LineError::UnknownAnchor(id))?;

        tracing::debug!(line = %line.name(), anchor = id, channel, "anchor socket opened");
        Ok(Self {
            line: line.clone(),
            id,
            channel,
            inbox,
            write_lock: AsyncMutex::new(()),
            closed: CancellationToken::new(),
        })
    }

    /// Wait for the next payload and copy it into `buf`.
    ///
    /// Returns the number of bytes copied; a payload longer than `buf` is
    /// truncated. Each call waits at most `read_timeout`. A closed socket
    /// wins over pending payloads.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut inbox = self.inbox.lock().await;
        let timeout = self.line.config().read_timeout;

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(LineError::Closed),
            payload = inbox.recv() => match payload {
                Some(payload) => {
                    let n = payload.len().min(buf.len());
                    buf[..n].copy_from_slice(&payload[..n]);
                    Ok(n)
                }
                None => Err(LineError::Closed),
            },
            _ = self.line.shutdown_token().cancelled() => Err(LineError::Disconnected),
            _ = tokio::time::sleep(timeout) => Err(LineError::Timeout(timeout)),
        }
    }

    /// Send `buf` as one HCI frame to this anchor.
    ///
    /// Waits while the line's send queue is full.
    pub async fn write(&self, buf: &[u8]) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let frame = Frame::hci(anchor_path(self.id)?, buf.to_vec());
        self.line.send(frame).await?;
        Ok(buf.len())
    }

    /// Close the socket and retire the anchor's inbox from the line.
    ///
    /// A blocked `read` returns [`LineError::Closed`]. The anchor cannot be
    /// reopened on this line afterwards.
    pub async fn close(&self) -> Result<()> {
        tracing::info!(line = %self.line.name(), anchor = self.id, "closing anchor socket");
        self.closed.cancel();

        if let Err(err) = self.write(&NOOP_COMMAND).await {
            tracing::debug!(anchor = self.id, error = %err, "no-op command not sent");
        }

        let _inbox = self.inbox.lock().await;
        self.line.retire_inbox(self.channel);
        Ok(())
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    /// Channel byte this socket writes to and reads from.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl std::fmt::Debug for AnchorSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnchorSocket")
            .field("line", &self.line.name())
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::config::LineConfig;

    fn line(anchors: u8) -> (BeaconLine, tokio::io::DuplexStream) {
        let (ours, theirs) = tokio::io::duplex(4096);
        let (tx, _rx) = mpsc::channel(16);
        let cfg = LineConfig::new("bl", "mem", anchors).with_read_timeout(Duration::from_millis(50));
        (BeaconLine::from_stream(cfg, ours, tx).unwrap(), theirs)
    }

    #[tokio::test]
    async fn open_maps_id_to_channel() {
        let (line, _peer) = line(3);
        let sock = AnchorSocket::open(&line, 2).unwrap();
        assert_eq!(sock.id(), 2);
        assert_eq!(sock.channel(), 11);
        assert!(!sock.is_closed());
    }

    #[tokio::test]
    async fn open_rejects_unknown_ids() {
        let (line, _peer) = line(2);
        assert!(matches!(AnchorSocket::open(&line, 0), Err(LineError::UnknownAnchor(0))));
        assert!(matches!(AnchorSocket::open(&line, 3), Err(LineError::UnknownAnchor(3))));
    }

    #[tokio::test]
    async fn read_times_out_without_data() {
        let (line, _peer) = line(1);
        let sock = AnchorSocket::open(&line, 1).unwrap();
        let mut buf = [0u8; 8];
        let err = sock.read(&mut buf).await.unwrap_err();
        assert!(matches!(err, LineError::Timeout(d) if d == Duration::from_millis(50)));
    }

    #[tokio::test(start_paused = true)]
    async fn default_read_timeout_is_five_seconds() {
        let (ours, _peer) = tokio::io::duplex(4096);
        let (tx, _rx) = mpsc::channel(16);
        let line = BeaconLine::from_stream(LineConfig::new("bl", "mem", 1), ours, tx).unwrap();
        let sock = AnchorSocket::open(&line, 1).unwrap();

        let started = tokio::time::Instant::now();
        let mut buf = [0u8; 8];
        let err = sock.read(&mut buf).await.unwrap_err();
        assert!(matches!(err, LineError::Timeout(d) if d == Duration::from_secs(5)));
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(5) && waited < Duration::from_secs(6));
    }

    #[tokio::test]
    async fn closed_socket_reads_end_of_stream_and_cannot_reopen() {
        let (line, _peer) = line(1);
        let sock = AnchorSocket::open(&line, 1).unwrap();
        sock.close().await.unwrap();
        assert!(sock.is_closed());

        let mut buf = [0u8; 8];
        assert!(matches!(sock.read(&mut buf).await, Err(LineError::Closed)));
        assert!(line.registered_anchors().is_empty());
        assert!(matches!(AnchorSocket::open(&line, 1), Err(LineError::UnknownAnchor(1))));
    }

    #[tokio::test]
    async fn read_reports_disconnect_when_line_ends() {
        let (line, peer) = line(1);
        let sock = AnchorSocket::open(&line, 1).unwrap();
        drop(peer);
        line.closed().await;

        let mut buf = [0u8; 8];
        assert!(matches!(sock.read(&mut buf).await, Err(LineError::Disconnected)));
        assert!(matches!(sock.write(b"x").await, Err(LineError::Disconnected)));
    }
}
