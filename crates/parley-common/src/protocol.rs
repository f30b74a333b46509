use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Kind of a session description in the offer/answer handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offer => write!(f, "offer"),
            Self::Answer => write!(f, "answer"),
        }
    }
}

/// An SDP blob tagged with its handshake role.
///
/// Immutable once built; a newer description replaces it instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    sdp_type: SdpType,
    sdp: String,
}

impl SessionDescription {
    pub fn new(sdp_type: SdpType, sdp: impl Into<String>) -> Self {
        Self {
            sdp_type,
            sdp: sdp.into(),
        }
    }

    pub fn offer(sdp: impl Into<String>) -> Self {
        Self::new(SdpType::Offer, sdp)
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self::new(SdpType::Answer, sdp)
    }

    pub fn sdp_type(&self) -> SdpType {
        self.sdp_type
    }

    pub fn sdp(&self) -> &str {
        &self.sdp
    }

    /// Decode a description received from the remote side.
    ///
    /// Anything that is not a `{type, sdp}` record with a known type is a
    /// protocol error.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|err| Error::protocol(format!("malformed session description: {err}")))
    }

    /// Fail with a protocol error unless this is an answer.
    pub fn expect_answer(self) -> Result<Self> {
        match self.sdp_type {
            SdpType::Answer => Ok(self),
            other => Err(Error::protocol(format!(
                "expected answer from remote, got {other}"
            ))),
        }
    }
}

/// Body of the offer/answer exchange request.
///
/// `device_id` selects which remote media source the answering side binds to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferRequest {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub device_id: String,
}

impl OfferRequest {
    pub fn new(offer: &SessionDescription, device_id: impl Into<String>) -> Self {
        Self {
            sdp: offer.sdp().to_string(),
            sdp_type: offer.sdp_type(),
            device_id: device_id.into(),
        }
    }
}

/// Snapshot returned by the hub's health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubHealth {
    pub active_connections: usize,
}
