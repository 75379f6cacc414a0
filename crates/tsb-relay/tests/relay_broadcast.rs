use std::time::Duration;

use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tsb_frame::codec::encode_wire;
use tsb_frame::{ChannelPath, Frame, TsbCodec, TypePath};
use tsb_relay::{ConnectionRegistry, RelayConfig, RelayHandle, RelayServer};

struct Running {
    addr: String,
    registry: ConnectionRegistry,
    handle: RelayHandle,
    stop: oneshot::Sender<()>,
    task: JoinHandle<tsb_relay::Result<()>>,
}

async fn start(config: RelayConfig) -> Running {
    let (server, handle) = RelayServer::bind(config).await.unwrap();
    let addr = server.local_addr().to_string();
    let registry = server.registry();
    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(server.run(async move {
        let _ = stopped.await;
    }));
    Running {
        addr,
        registry,
        handle,
        stop,
        task,
    }
}

async fn wait_for_clients(registry: &ConnectionRegistry, n: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while registry.len() != n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

fn frame(channel: u8, payload: &[u8]) -> Frame {
    Frame::hci(ChannelPath::single(channel).unwrap(), payload.to_vec())
}

#[tokio::test]
async fn outbound_frame_reaches_every_client_identically() {
    let relay = start(RelayConfig::new("127.0.0.1:0")).await;
    let mut a = TcpStream::connect(&relay.addr).await.unwrap();
    let mut b = TcpStream::connect(&relay.addr).await.unwrap();
    wait_for_clients(&relay.registry, 2).await;

    let out = frame(6, &[0x04, 0x0e, 0x00, 0x01]);
    relay.handle.outbound.send(out.clone()).await.unwrap();

    let mut expected = BytesMut::new();
    encode_wire(&out, &mut expected);

    let mut got_a = vec![0u8; expected.len()];
    let mut got_b = vec![0u8; expected.len()];
    a.read_exact(&mut got_a).await.unwrap();
    b.read_exact(&mut got_b).await.unwrap();
    assert_eq!(got_a, expected.to_vec());
    assert_eq!(got_a, got_b);

    relay.stop.send(()).unwrap();
    relay.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn disconnected_client_does_not_affect_the_other() {
    let relay = start(RelayConfig::new("127.0.0.1:0")).await;
    let a = TcpStream::connect(&relay.addr).await.unwrap();
    let b = TcpStream::connect(&relay.addr).await.unwrap();
    wait_for_clients(&relay.registry, 2).await;

    drop(a);
    wait_for_clients(&relay.registry, 1).await;

    let mut b = Framed::new(b, TsbCodec::default());
    for i in 0..5u8 {
        relay.handle.outbound.send(frame(11, &[i])).await.unwrap();
    }
    for i in 0..5u8 {
        let got = tokio::time::timeout(Duration::from_secs(1), b.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(got, frame(11, &[i]));
    }

    relay.stop.send(()).unwrap();
    relay.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn client_frames_merge_into_inbound() {
    let mut relay = start(RelayConfig::new("127.0.0.1:0")).await;
    let mut a = Framed::new(
        TcpStream::connect(&relay.addr).await.unwrap(),
        TsbCodec::default(),
    );
    let mut b = Framed::new(
        TcpStream::connect(&relay.addr).await.unwrap(),
        TsbCodec::default(),
    );
    wait_for_clients(&relay.registry, 2).await;

    let from_a = frame(6, b"from-a");
    let from_b = Frame::new(
        "2.3".parse().unwrap(),
        TypePath::error(),
        &b"from-b"[..],
    );
    a.send(from_a.clone()).await.unwrap();
    let first = relay.handle.inbound.recv().await.unwrap();
    b.send(from_b.clone()).await.unwrap();
    let second = relay.handle.inbound.recv().await.unwrap();

    assert_eq!(first, from_a);
    assert_eq!(second, from_b);

    relay.stop.send(()).unwrap();
    relay.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn slow_client_drops_frames_without_stalling_others() {
    let relay = start(RelayConfig::new("127.0.0.1:0").with_client_queue(1)).await;
    // `slow` is never read.
    let _slow = TcpStream::connect(&relay.addr).await.unwrap();
    let fast = TcpStream::connect(&relay.addr).await.unwrap();
    wait_for_clients(&relay.registry, 2).await;

    let mut fast = Framed::new(fast, TsbCodec::default());
    let payload = vec![0x5a; 32 * 1024];
    for _ in 0..64 {
        relay.handle.outbound.send(frame(16, &payload)).await.unwrap();
        let got = tokio::time::timeout(Duration::from_secs(2), fast.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(got.payload.len(), payload.len());
    }
    assert_eq!(relay.registry.len(), 2);

    relay.stop.send(()).unwrap();
    relay.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_closes_client_connections() {
    let relay = start(RelayConfig::new("127.0.0.1:0")).await;
    let mut a = TcpStream::connect(&relay.addr).await.unwrap();
    wait_for_clients(&relay.registry, 1).await;

    relay.stop.send(()).unwrap();
    relay.task.await.unwrap().unwrap();

    let mut buf = [0u8; 8];
    let n = tokio::time::timeout(Duration::from_secs(1), a.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
    assert!(relay.registry.is_empty());
}

#[tokio::test]
async fn bind_failure_is_reported() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap().to_string();
    let err = RelayServer::bind(RelayConfig::new(addr)).await.unwrap_err();
    assert!(matches!(err, tsb_relay::RelayError::Transport(_)));
}
