use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tsb_frame::{ChannelPath, Frame, TsbCodec, TypePath};
use tsb_line::{AnchorSocket, BeaconLine, LineConfig, LineError, Notification, NOOP_COMMAND};

/// Fake anchor hub: accepts one line and exposes its framed stream.
async fn hub() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

async fn accept(listener: &TcpListener) -> Framed<TcpStream, TsbCodec> {
    let (stream, _) = listener.accept().await.unwrap();
    Framed::new(stream, TsbCodec::default())
}

fn hci(channel: u8, payload: &[u8]) -> Frame {
    Frame::hci(ChannelPath::single(channel).unwrap(), payload.to_vec())
}

async fn connect(
    addr: &str,
    anchors: u8,
    read_timeout: Duration,
) -> (BeaconLine, mpsc::Receiver<Notification>) {
    let cfg = LineConfig::new("line-a", addr, anchors).with_read_timeout(read_timeout);
    let (tx, rx) = cfg.notification_channel();
    (BeaconLine::connect(cfg, tx).await.unwrap(), rx)
}

#[tokio::test]
async fn payloads_only_reach_their_own_anchor() {
    let (listener, addr) = hub().await;
    let (line, _notes) = connect(&addr, 3, Duration::from_millis(200)).await;
    let mut peer = accept(&listener).await;

    peer.send(hci(6, b"one")).await.unwrap();
    peer.send(hci(16, b"three")).await.unwrap();

    let a1 = AnchorSocket::open(&line, 1).unwrap();
    let a2 = AnchorSocket::open(&line, 2).unwrap();
    let a3 = AnchorSocket::open(&line, 3).unwrap();

    let mut buf = [0u8; 32];
    let n = a1.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"one");
    let n = a3.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"three");
    assert!(matches!(a2.read(&mut buf).await, Err(LineError::Timeout(_))));
}

#[tokio::test]
async fn full_inbox_keeps_the_oldest_payloads() {
    let (listener, addr) = hub().await;
    let (line, _notes) = connect(&addr, 1, Duration::from_millis(100)).await;
    let mut peer = accept(&listener).await;

    for i in 0..15u8 {
        peer.send(hci(6, &[i])).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(line.stats().dropped, 5);

    let sock = AnchorSocket::open(&line, 1).unwrap();
    let mut buf = [0u8; 4];
    for expected in 0..10u8 {
        let n = sock.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[expected]);
    }
    assert!(matches!(sock.read(&mut buf).await, Err(LineError::Timeout(_))));
}

#[tokio::test]
async fn short_buffer_truncates_payload() {
    let (listener, addr) = hub().await;
    let (line, _notes) = connect(&addr, 1, Duration::from_millis(200)).await;
    let mut peer = accept(&listener).await;

    peer.send(hci(6, b"abcdef")).await.unwrap();
    let sock = AnchorSocket::open(&line, 1).unwrap();
    let mut buf = [0u8; 3];
    assert_eq!(sock.read(&mut buf).await.unwrap(), 3);
    assert_eq!(&buf, b"abc");
}

#[tokio::test]
async fn close_unblocks_a_pending_read() {
    let (listener, addr) = hub().await;
    let (line, _notes) = connect(&addr, 2, Duration::from_secs(5)).await;
    let mut peer = accept(&listener).await;

    let sock = Arc::new(AnchorSocket::open(&line, 2).unwrap());
    let reader = {
        let sock = Arc::clone(&sock);
        tokio::spawn(async move {
            let mut buf = [0u8; 8];
            let started = Instant::now();
            let res = sock.read(&mut buf).await;
            (res, started.elapsed())
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    let closer = {
        let sock = Arc::clone(&sock);
        tokio::spawn(async move { sock.close().await })
    };

    let (res, waited) = reader.await.unwrap();
    assert!(matches!(res, Err(LineError::Closed)));
    assert!(waited < Duration::from_secs(1));
    closer.await.unwrap().unwrap();

    let noop = peer.next().await.unwrap().unwrap();
    assert_eq!(noop, hci(11, &NOOP_COMMAND));
    assert_eq!(line.registered_anchors(), vec![1]);
}

#[tokio::test]
async fn writes_arrive_in_call_order() {
    let (listener, addr) = hub().await;
    let (line, _notes) = connect(&addr, 4, Duration::from_millis(200)).await;
    let mut peer = accept(&listener).await;

    let sock = AnchorSocket::open(&line, 4).unwrap();
    for i in 0..20u8 {
        assert_eq!(sock.write(&[0x01, i]).await.unwrap(), 2);
    }

    for i in 0..20u8 {
        let frame = peer.next().await.unwrap().unwrap();
        assert_eq!(frame.channel.as_single(), Some(21));
        assert_eq!(frame.type_code(), tsb_frame::types::HCI);
        assert_eq!(frame.payload.as_ref(), &[0x01, i]);
    }
}

#[tokio::test]
async fn anchor_log_and_unexpected_frames_are_notified() {
    let (listener, addr) = hub().await;
    let (_line, mut notes) = connect(&addr, 2, Duration::from_millis(200)).await;
    let mut peer = accept(&listener).await;

    peer.send(Frame::new(
        ChannelPath::single(11).unwrap(),
        TypePath::error(),
        &b"buffer overrun"[..],
    ))
    .await
    .unwrap();
    peer.send(Frame::new(
        ChannelPath::single(1).unwrap(),
        TypePath::code(tsb_frame::types::RAW).unwrap(),
        vec![0xca, 0xfe],
    ))
    .await
    .unwrap();

    let log = notes.recv().await.unwrap().to_string();
    assert!(log.ends_with(": Anchor:  2 says: buffer overrun"), "{log}");
    let other = notes.recv().await.unwrap().to_string();
    assert!(
        other.ends_with(": Unexpected tsb-packet: ch: 01, typ: 01 (raw) payload: ca fe"),
        "{other}"
    );
}

#[tokio::test]
async fn shutdown_flushes_queued_writes_and_noops() {
    let (listener, addr) = hub().await;
    let (line, _notes) = connect(&addr, 2, Duration::from_millis(200)).await;
    let mut peer = accept(&listener).await;

    let a = AnchorSocket::open(&line, 1).unwrap();
    let b = AnchorSocket::open(&line, 2).unwrap();
    a.write(&[0x01, 0x03, 0x0c, 0x00]).await.unwrap();
    a.close().await.unwrap();
    b.close().await.unwrap();
    line.shutdown();

    let mut received = Vec::new();
    let drained = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(frame) = peer.next().await {
            received.push(frame.unwrap());
        }
    })
    .await;
    assert!(drained.is_ok(), "line never closed its end of the connection");

    assert_eq!(
        received,
        vec![
            hci(6, &[0x01, 0x03, 0x0c, 0x00]),
            hci(6, &NOOP_COMMAND),
            hci(11, &NOOP_COMMAND),
        ]
    );
    assert_eq!(line.stats().sent, 3);

    let err = line.send(hci(6, b"late")).await.unwrap_err();
    assert!(matches!(err, LineError::Disconnected));
}

#[tokio::test]
async fn hub_disconnect_terminates_line() {
    let (listener, addr) = hub().await;
    let (line, _notes) = connect(&addr, 1, Duration::from_secs(5)).await;
    let peer = accept(&listener).await;
    let sock = AnchorSocket::open(&line, 1).unwrap();

    drop(peer);
    tokio::time::timeout(Duration::from_secs(2), line.closed())
        .await
        .unwrap();

    let mut buf = [0u8; 4];
    assert!(matches!(sock.read(&mut buf).await, Err(LineError::Disconnected)));
}

#[tokio::test]
async fn dial_failure_is_returned() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().to_string()
    };
    let cfg = LineConfig::new("line-x", addr, 1);
    let (tx, _rx) = cfg.notification_channel();
    let err = BeaconLine::connect(cfg, tx).await.unwrap_err();
    assert!(matches!(err, LineError::Transport(_)));
}
