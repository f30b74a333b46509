//! Offer/answer exchange through a live relay hub.
//!
//! Covers:
//! - offer delivered to the other participant as JSON
//! - non-description frames skipped until an answer arrives
//! - unreachable hub reported as a transport error

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use parley_client::{HubExchange, OfferExchange};
use parley_common::{Error, OfferRequest, SdpType, SessionDescription};
use parley_hub::{Hub, HubConfig};

async fn start_hub() -> (Hub, String, oneshot::Sender<()>) {
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

    (hub, parley_hub::ws_url_for_bound_addr(addr), shutdown_tx)
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

#[tokio::test]
async fn test_answer_returned_through_hub() {
    let (hub, url, _shutdown) = start_hub().await;
    let (mut answerer, _) = connect_async(url.as_str())
        .await
        .expect("Failed to connect answerer");
    wait_for_connections(&hub, 1).await;

    let exchange = HubExchange::new(url.clone());
    let offer = OfferRequest::new(&SessionDescription::offer("v=0\r\noffer\r\n"), "/dev/video2");
    let pending = tokio::spawn(async move { exchange.exchange(offer).await });

    let received = tokio::time::timeout(Duration::from_secs(2), answerer.next())
        .await
        .expect("Timed out waiting for offer")
        .expect("Stream ended")
        .expect("Websocket error");
    let text = match received {
        Message::Text(text) => text.as_str().to_string(),
        other => panic!("unexpected message: {:?}", other),
    };
    let request: OfferRequest = serde_json::from_str(&text).unwrap();
    assert_eq!(request.sdp_type, SdpType::Offer);
    assert_eq!(request.device_id, "/dev/video2");
    assert_eq!(request.sdp, "v=0\r\noffer\r\n");

    answerer
        .send(Message::Text("camera warming up".into()))
        .await
        .unwrap();
    let answer = serde_json::to_string(&SessionDescription::answer("v=0\r\nanswer\r\n")).unwrap();
    answerer.send(Message::Text(answer.into())).await.unwrap();

    let desc = tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .expect("Timed out waiting for exchange")
        .unwrap()
        .unwrap();
    assert_eq!(desc.sdp_type(), SdpType::Answer);
    assert_eq!(desc.sdp(), "v=0\r\nanswer\r\n");
}

#[tokio::test]
async fn test_unreachable_hub_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let exchange = HubExchange::new(format!("ws://{}/ws", addr));
    let offer = OfferRequest::new(&SessionDescription::offer("v=0\r\n"), "/dev/video2");
    let err = exchange.exchange(offer).await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "got {err:?}");
}
