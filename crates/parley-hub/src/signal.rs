use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
};
use futures::{stream::StreamExt, SinkExt};
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::hub::{Frame, Hub};
use crate::AppState;

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(data) => Message::Binary(data),
        }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    let max_bytes = state.config.max_message_bytes;
    ws.max_message_size(max_bytes)
        .max_frame_size(max_bytes)
        .on_upgrade(move |socket| handle_socket(socket, state.hub, addr))
}

async fn handle_socket(stream: WebSocket, hub: Hub, addr: SocketAddr) {
    let (handle, mut outbox) = hub.connect().await;
    let id = handle.id();
    info!("client {} connected from {}", id, addr);

    let (mut sender, mut receiver) = stream.split();
    let (disconnect_tx, mut disconnect_rx) = mpsc::channel::<()>(1);

    let writer_handle = handle.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbox.recv().await {
            if sender.send(frame.into()).await.is_err() {
                break;
            }
        }
        writer_handle.mark_closing();
        let _ = disconnect_tx.try_send(());
    });

    loop {
        tokio::select! {
            _ = disconnect_rx.recv() => {
                break;
            }
            msg = receiver.next() => {
                let Some(msg) = msg else { break; };
                let msg = match msg {
                    Ok(msg) => msg,
                    Err(err) => {
                        warn!("read error from {}: {}", id, err);
                        break;
                    }
                };

                let frame = match msg {
                    Message::Text(text) => Frame::Text(text),
                    Message::Binary(data) => Frame::Binary(data),
                    Message::Close(_) => break,
                    Message::Ping(_) | Message::Pong(_) => continue,
                };

                let delivered = hub.relay(id, frame).await;
                debug!("message from {} delivered to {} peer(s)", id, delivered);
            }
        }
    }

    handle.mark_closing();
    hub.disconnect(id).await;
    writer.abort();
    info!("client {} disconnected", id);
    if hub.is_empty().await {
        debug!("no clients connected");
    }
}
