//! Offerer side of a Parley call: negotiates one receive-only media session
//! with a remote answerer.

#![forbid(unsafe_code)]

pub mod capability;
pub mod engine;
pub mod exchange;
pub mod gather;
pub mod rtc;
pub mod signaling;
pub mod types;

#[cfg(test)]
mod fake;

pub use capability::{
    GatheringState, MediaKind, PeerConnection, PeerConnectionFactory, PeerConnectionState,
    RemoteTrack, RtcConfig, SdpSemantics, TransceiverDirection,
};
pub use engine::NegotiationEngine;
pub use exchange::{HttpExchange, OfferExchange, DEFAULT_OFFER_ENDPOINT};
pub use gather::wait_for_gathering_complete;
pub use rtc::{WebRtcFactory, WebRtcPeer};
pub use signaling::HubExchange;
pub use types::{EngineConfig, EngineEvent, NegotiationState};
