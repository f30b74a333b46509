//! End-to-end tests for the relay hub over real websockets.
//!
//! Covers:
//! - fan-out to every other open connection, never back to the sender
//! - disconnect removing a connection from future broadcasts
//! - binary frames and the health endpoint

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use parley_hub::{Hub, HubConfig};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestHub {
    hub: Hub,
    ws_url: String,
    http_url: String,
    _shutdown: oneshot::Sender<()>,
}

async fn start_hub() -> TestHub {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().unwrap();
    let hub = Hub::default();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let server_hub = hub.clone();
    tokio::spawn(async move {
        parley_hub::serve(listener, server_hub, HubConfig::default(), async move {
            let _ = shutdown_rx.await;
        })
        .await
        .expect("hub server failed");
    });

    TestHub {
        hub,
        ws_url: parley_hub::ws_url_for_bound_addr(addr),
        http_url: format!("http://{}", addr),
        _shutdown: shutdown_tx,
    }
}

async fn connect(hub: &TestHub, expected: usize) -> Client {
    let (ws, _) = connect_async(hub.ws_url.as_str())
        .await
        .expect("Failed to connect to hub");
    wait_for_connections(&hub.hub, expected).await;
    ws
}

async fn wait_for_connections(hub: &Hub, expected: usize) {
    for _ in 0..200 {
        if hub.len().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("hub never reached {} connections", expected);
}

async fn next_text(ws: &mut Client) -> String {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("Timed out waiting for message")
            .expect("Stream ended")
            .expect("Websocket error");
        match msg {
            Message::Text(text) => return text.as_str().to_string(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message: {:?}", other),
        }
    }
}

async fn assert_silent(ws: &mut Client) {
    let result = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
    assert!(result.is_err(), "expected no message, got {:?}", result);
}

#[tokio::test]
async fn test_message_reaches_every_other_client() {
    let hub = start_hub().await;
    let mut a = connect(&hub, 1).await;
    let mut b = connect(&hub, 2).await;
    let mut c = connect(&hub, 3).await;

    a.send(Message::Text("x".into())).await.unwrap();

    assert_eq!(next_text(&mut b).await, "x");
    assert_eq!(next_text(&mut c).await, "x");
    assert_silent(&mut a).await;
}

#[tokio::test]
async fn test_payload_is_forwarded_verbatim() {
    let hub = start_hub().await;
    let mut a = connect(&hub, 1).await;
    let mut b = connect(&hub, 2).await;

    let offer = r#"{"sdp":"v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\n","type":"offer","device_id":"/dev/video2"}"#;
    a.send(Message::Text(offer.into())).await.unwrap();
    assert_eq!(next_text(&mut b).await, offer);

    b.send(Message::Text("not json at all {".into())).await.unwrap();
    assert_eq!(next_text(&mut a).await, "not json at all {");
}

#[tokio::test]
async fn test_disconnected_client_is_removed() {
    let hub = start_hub().await;
    let mut a = connect(&hub, 1).await;
    let b = connect(&hub, 2).await;
    let mut c = connect(&hub, 3).await;

    drop(b);
    wait_for_connections(&hub.hub, 2).await;

    a.send(Message::Text("after".into())).await.unwrap();
    assert_eq!(next_text(&mut c).await, "after");
}

#[tokio::test]
async fn test_binary_frames_are_relayed() {
    let hub = start_hub().await;
    let mut a = connect(&hub, 1).await;
    let mut b = connect(&hub, 2).await;

    a.send(Message::Binary(vec![1u8, 2, 3].into())).await.unwrap();
    let msg = tokio::time::timeout(Duration::from_secs(2), b.next())
        .await
        .expect("Timed out waiting for message")
        .expect("Stream ended")
        .expect("Websocket error");
    match msg {
        Message::Binary(data) => assert_eq!(data.as_ref(), &[1u8, 2, 3][..]),
        other => panic!("unexpected message: {:?}", other),
    }
}

#[tokio::test]
async fn test_health_reports_active_connections() {
    let hub = start_hub().await;
    let _a = connect(&hub, 1).await;
    let _b = connect(&hub, 2).await;

    let health: parley_common::HubHealth = reqwest::get(format!("{}/health", hub.http_url))
        .await
        .expect("Health request failed")
        .json()
        .await
        .expect("Invalid health body");
    assert_eq!(health.active_connections, 2);
}
