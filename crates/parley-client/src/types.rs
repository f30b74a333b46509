use std::fmt;
use std::time::Duration;

use crate::capability::{MediaKind, RemoteTrack, RtcConfig};

pub const DEFAULT_DEVICE_ID: &str = "/dev/video2";
pub const DEFAULT_GATHER_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Remote media source the answering side should bind to.
    pub device_id: String,
    pub media_kind: MediaKind,
    /// `None` waits for gathering indefinitely.
    pub gather_timeout: Option<Duration>,
    /// `None` waits for the answer indefinitely.
    pub exchange_timeout: Option<Duration>,
    /// Delay between cancelling a call and closing its peer connection.
    pub stop_grace: Duration,
    pub ice_servers: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device_id: DEFAULT_DEVICE_ID.to_string(),
            media_kind: MediaKind::Video,
            gather_timeout: Some(DEFAULT_GATHER_TIMEOUT),
            exchange_timeout: Some(DEFAULT_EXCHANGE_TIMEOUT),
            stop_grace: DEFAULT_STOP_GRACE,
            ice_servers: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn rtc_config(&self) -> RtcConfig {
        RtcConfig {
            ice_servers: self.ice_servers.clone(),
            ..RtcConfig::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegotiationState {
    #[default]
    Idle,
    OfferCreated,
    Gathering,
    OfferSent,
    AnswerReceived,
    Connected,
    Failed,
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::OfferCreated => "offer-created",
            Self::Gathering => "gathering",
            Self::OfferSent => "offer-sent",
            Self::AnswerReceived => "answer-received",
            Self::Connected => "connected",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Notifications emitted by the engine for the rendering surface and logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    StateChanged(NegotiationState),
    Track(RemoteTrack),
    Failed(String),
}
