//! Offer/answer exchange through the relay hub.
//!
//! The hub forwards every frame to all other participants, so the offer is
//! sent fire-and-forget and the reply is whatever session description the
//! remote side broadcasts back.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use parley_common::{Error, OfferRequest, Result, SessionDescription};

use crate::exchange::OfferExchange;

#[derive(Debug, Clone)]
pub struct HubExchange {
    url: String,
}

impl HubExchange {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl OfferExchange for HubExchange {
    async fn exchange(&self, offer: OfferRequest) -> Result<SessionDescription> {
        let (mut ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::transport(format!("hub connect failed: {e}")))?;

        let text = serde_json::to_string(&offer)?;
        ws.send(Message::Text(text.into()))
            .await
            .map_err(|e| Error::transport(format!("failed to send offer: {e}")))?;
        debug!("offer sent through hub {}", self.url);

        while let Some(msg) = ws.next().await {
            let msg = msg.map_err(|e| Error::transport(format!("hub connection error: {e}")))?;
            match msg {
                Message::Text(text) => match SessionDescription::from_json(text.as_str()) {
                    Ok(desc) => {
                        if let Err(e) = ws.close(None).await {
                            debug!("hub close failed: {}", e);
                        }
                        return Ok(desc);
                    }
                    Err(_) => debug!("skipping non-description frame ({} bytes)", text.len()),
                },
                Message::Close(frame) => {
                    warn!("hub closed the connection: {:?}", frame);
                    break;
                }
                _ => continue,
            }
        }

        Err(Error::transport("hub connection closed before an answer arrived"))
    }
}
