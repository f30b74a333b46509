//! Offer/answer exchange over HTTP.

use async_trait::async_trait;
use tracing::debug;

use parley_common::{Error, OfferRequest, Result, SessionDescription};

pub const DEFAULT_OFFER_ENDPOINT: &str = "http://127.0.0.1:8080/offer";

/// Delivers a local offer to the answering side and returns its reply.
///
/// Implementations report unreachable peers as [`Error::Transport`] and
/// unreadable replies as [`Error::Protocol`]. The reply type is not checked
/// here; the engine rejects anything that is not an answer.
#[async_trait]
pub trait OfferExchange: Send + Sync {
    async fn exchange(&self, offer: OfferRequest) -> Result<SessionDescription>;
}

/// POSTs the offer as JSON to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct HttpExchange {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpExchange {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Default for HttpExchange {
    fn default() -> Self {
        Self::new(DEFAULT_OFFER_ENDPOINT)
    }
}

#[async_trait]
impl OfferExchange for HttpExchange {
    async fn exchange(&self, offer: OfferRequest) -> Result<SessionDescription> {
        debug!("posting offer to {} for {}", self.endpoint, offer.device_id);
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&offer)
            .send()
            .await
            .map_err(|e| Error::transport(format!("offer request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::transport(format!(
                "offer endpoint returned {status}"
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| Error::transport(format!("failed to read answer body: {e}")))?;
        SessionDescription::from_json(&body)
    }
}
