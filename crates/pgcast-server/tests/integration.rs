//! End-to-end tests using real `WebSocket` clients and the in-memory source.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use pgcast_core::ClientId;
use pgcast_listener::{MemoryPublisher, MemorySource, NotificationSource};
use pgcast_server::{run_relay, RelayServer, ServerConfig};
use serde_json::Value;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);
const CHANNEL: &str = "http_response_inserted";
const PAYLOAD: &str = "node1,10.0.0.5,443,200";

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct Harness {
    url: String,
    server: Arc<RelayServer>,
    publisher: MemoryPublisher,
    _source: MemorySource,
}

/// Boot a server on an ephemeral port with a relay fed by a memory source.
async fn boot() -> Harness {
    boot_with(ServerConfig::default()).await
}

async fn boot_with(config: ServerConfig) -> Harness {
    let config = ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        ..config
    };
    let server = Arc::new(RelayServer::new(config, CHANNEL));
    let (addr, _handle) = server.listen().await.unwrap();

    let (mut source, publisher) = MemorySource::new();
    let stream = source.subscribe(CHANNEL).await.unwrap();
    let _relay = tokio::spawn(run_relay(
        stream,
        Arc::clone(server.broadcaster()),
        server.shutdown().token(),
    ));

    Harness {
        url: format!("ws://{addr}/ws"),
        server,
        publisher,
        _source: source,
    }
}

async fn connect(url: &str) -> WsStream {
    let (ws, _resp) = timeout(TIMEOUT, connect_async(url)).await.unwrap().unwrap();
    ws
}

/// Next text frame, skipping control frames.
async fn recv_text(ws: &mut WsStream) -> String {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("transport error");
        match msg {
            Message::Text(t) => return t.as_str().to_owned(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Read both handshake frames and return the assigned identity.
async fn handshake(ws: &mut WsStream) -> String {
    let first: Value = serde_json::from_str(&recv_text(ws).await).unwrap();
    assert_eq!(first["action"], "client_id");
    let id = first["clientId"].as_str().unwrap().to_string();

    let second: Value = serde_json::from_str(&recv_text(ws).await).unwrap();
    assert_eq!(second["action"], "subscribe");
    assert_eq!(second["channel"], CHANNEL);
    id
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    timeout(TIMEOUT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached");
}

#[tokio::test]
async fn three_clients_receive_payload_and_late_joiner_only_future_events() {
    let h = boot().await;

    let mut clients = Vec::new();
    let mut ids = Vec::new();
    for _ in 0..3 {
        let mut ws = connect(&h.url).await;
        ids.push(handshake(&mut ws).await);
        clients.push(ws);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3, "identities must be unique");

    assert!(h.publisher.publish(CHANNEL, PAYLOAD));
    for ws in &mut clients {
        assert_eq!(recv_text(ws).await, PAYLOAD);
    }

    let mut late = connect(&h.url).await;
    let late_id = handshake(&mut late).await;
    assert!(!ids.contains(&late_id));
    assert_eq!(h.server.registry().open_count(), 4);

    assert!(h.publisher.publish(CHANNEL, "node2,10.0.0.6,80,404"));
    assert_eq!(recv_text(&mut late).await, "node2,10.0.0.6,80,404");
    for ws in &mut clients {
        assert_eq!(recv_text(ws).await, "node2,10.0.0.6,80,404");
    }
}

#[tokio::test]
async fn disconnect_during_broadcast_does_not_affect_others() {
    let h = boot().await;

    let mut clients = Vec::new();
    for _ in 0..3 {
        let mut ws = connect(&h.url).await;
        let _ = handshake(&mut ws).await;
        clients.push(ws);
    }

    let mut leaving = clients.remove(0);
    leaving.close(None).await.unwrap();
    drop(leaving);
    assert!(h.publisher.publish(CHANNEL, PAYLOAD));

    for ws in &mut clients {
        assert_eq!(recv_text(ws).await, PAYLOAD);
    }
    let registry = Arc::clone(h.server.registry());
    wait_until(|| registry.len() == 2).await;
}

#[tokio::test]
async fn unrelated_channel_produces_no_frame() {
    let h = boot().await;
    let mut ws = connect(&h.url).await;
    let _ = handshake(&mut ws).await;

    assert!(h.publisher.publish("other_channel", "should not arrive"));
    assert!(h.publisher.publish(CHANNEL, PAYLOAD));

    // Events are relayed in order, so the first frame must be the forwarded one.
    assert_eq!(recv_text(&mut ws).await, PAYLOAD);
}

#[tokio::test]
async fn malformed_input_keeps_connection_and_subscribe_is_recorded() {
    let h = boot().await;
    let mut ws = connect(&h.url).await;
    let id = ClientId::from_raw(handshake(&mut ws).await);
    let mut other = connect(&h.url).await;
    let other_id = ClientId::from_raw(handshake(&mut other).await);

    ws.send(Message::Text("not json".into())).await.unwrap();
    ws.send(Message::Binary(vec![0xff, 0xfe, 0x00].into())).await.unwrap();
    ws.send(Message::Text(r#"{"action":"subscribe","channel":"alerts"}"#.into()))
        .await
        .unwrap();

    let registry = Arc::clone(h.server.registry());
    wait_until(|| registry.subscription(&id).as_deref() == Some("alerts")).await;
    assert_eq!(registry.subscription(&other_id).as_deref(), Some(CHANNEL));
    assert!(registry.get(&id).unwrap().is_open());

    // Subscription is tracked, not used for filtering.
    assert!(h.publisher.publish(CHANNEL, PAYLOAD));
    assert_eq!(recv_text(&mut ws).await, PAYLOAD);
    assert_eq!(recv_text(&mut other).await, PAYLOAD);
}

#[tokio::test]
async fn client_asserted_identity_is_not_adopted() {
    let h = boot().await;
    let mut ws = connect(&h.url).await;
    let assigned = ClientId::from_raw(handshake(&mut ws).await);

    ws.send(Message::Text(r#"{"action":"client_id","clientId":"self-made"}"#.into()))
        .await
        .unwrap();
    assert!(h.publisher.publish(CHANNEL, PAYLOAD));
    assert_eq!(recv_text(&mut ws).await, PAYLOAD);

    let registry = h.server.registry();
    assert!(registry.get(&assigned).is_some());
    assert!(registry.get(&ClientId::from_raw("self-made")).is_none());
}

#[tokio::test]
async fn root_path_serves_websocket() {
    let h = boot().await;
    let root = h.url.trim_end_matches("/ws").to_string() + "/";
    let mut ws = connect(&root).await;
    let _ = handshake(&mut ws).await;
    assert!(h.publisher.publish(CHANNEL, PAYLOAD));
    assert_eq!(recv_text(&mut ws).await, PAYLOAD);
}

#[tokio::test]
async fn shutdown_closes_connections_and_stops_relay() {
    let h = boot().await;
    let mut ws = connect(&h.url).await;
    let _ = handshake(&mut ws).await;

    h.server.shutdown().shutdown();
    assert_eq!(h.server.close_connections(), 1);

    let frame = loop {
        let msg = timeout(TIMEOUT, ws.next()).await.unwrap();
        match msg {
            Some(Ok(Message::Close(frame))) => break frame,
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            other => panic!("expected close frame, got {other:?}"),
        }
    };
    let frame = frame.expect("close frame carries a code");
    assert_eq!(u16::from(frame.code), 1001);

    let registry = Arc::clone(h.server.registry());
    wait_until(|| registry.is_empty()).await;

    // The relay pump stops with the shutdown token and drops its stream.
    let publisher = h.publisher.clone();
    wait_until(|| !publisher.publish(CHANNEL, PAYLOAD)).await;
}

#[tokio::test]
async fn silent_client_is_dropped_after_heartbeat_timeout() {
    let h = boot_with(ServerConfig {
        heartbeat_interval_secs: 1,
        heartbeat_timeout_secs: 1,
        ..ServerConfig::default()
    })
    .await;

    let mut silent = connect(&h.url).await;
    let _ = handshake(&mut silent).await;
    let registry = Arc::clone(h.server.registry());
    assert_eq!(registry.open_count(), 1);

    // Not polling the socket means Pings are never answered.
    wait_until(|| registry.is_empty()).await;

    // The relay keeps serving new clients.
    let mut fresh = connect(&h.url).await;
    let _ = handshake(&mut fresh).await;
    assert!(h.publisher.publish(CHANNEL, PAYLOAD));
    assert_eq!(recv_text(&mut fresh).await, PAYLOAD);
    drop(silent);
}
