//! [`PeerConnection`] over webrtc-rs.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_gathering_state::RTCIceGatheringState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;

use parley_common::{Error, Result, SdpType, SessionDescription};

use crate::capability::{
    ConnectionStateListener, GatheringListener, GatheringState, ListenerId, ListenerSet,
    MediaKind, PeerConnection, PeerConnectionFactory, PeerConnectionState, RemoteTrack, RtcConfig,
    TrackListener, TransceiverDirection,
};

/// Builds a fresh webrtc-rs API (default codecs and interceptors) per call.
#[derive(Debug, Clone, Default)]
pub struct WebRtcFactory;

#[async_trait]
impl PeerConnectionFactory for WebRtcFactory {
    async fn create(&self, config: &RtcConfig) -> Result<Arc<dyn PeerConnection>> {
        let peer = WebRtcPeer::connect(config).await?;
        Ok(Arc::new(peer))
    }
}

pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
    gathering: Arc<ListenerSet<GatheringState>>,
}

impl WebRtcPeer {
    pub async fn connect(config: &RtcConfig) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::capability(format!("failed to register codecs: {e}")))?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| Error::capability(format!("failed to register interceptors: {e}")))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers(&config.ice_servers),
            ..Default::default()
        };
        let pc = api
            .new_peer_connection(rtc_config)
            .await
            .map_err(|e| Error::capability(format!("failed to create peer connection: {e}")))?;

        let gathering: Arc<ListenerSet<GatheringState>> = Arc::new(ListenerSet::new());
        let fanout = gathering.clone();
        pc.on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
            debug!("ICE gathering state: {:?}", state);
            if let Some(state) = gathering_from_gatherer(state) {
                fanout.emit(state);
            }
            Box::pin(async {})
        }));

        Ok(Self {
            pc: Arc::new(pc),
            gathering,
        })
    }
}

#[async_trait]
impl PeerConnection for WebRtcPeer {
    async fn add_transceiver(
        &self,
        kind: MediaKind,
        direction: TransceiverDirection,
    ) -> Result<()> {
        let init = RTCRtpTransceiverInit {
            direction: direction_to_rtc(direction),
            send_encodings: vec![],
        };
        self.pc
            .add_transceiver_from_kind(kind_to_rtc(kind), Some(init))
            .await
            .map_err(|e| Error::capability(format!("failed to add {kind} transceiver: {e}")))?;
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| Error::capability(format!("failed to create offer: {e}")))?;
        description_from_rtc(offer)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        let desc = description_to_rtc(desc)?;
        self.pc
            .set_local_description(desc)
            .await
            .map_err(|e| Error::capability(format!("failed to set local description: {e}")))
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let desc = self.pc.local_description().await?;
        description_from_rtc(desc).ok()
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        let desc = description_to_rtc(desc)?;
        self.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| Error::capability(format!("failed to set remote description: {e}")))
    }

    fn gathering_state(&self) -> GatheringState {
        match self.pc.ice_gathering_state() {
            RTCIceGatheringState::Complete => GatheringState::Complete,
            RTCIceGatheringState::Gathering => GatheringState::Gathering,
            _ => GatheringState::New,
        }
    }

    fn add_gathering_listener(&self, listener: GatheringListener) -> ListenerId {
        self.gathering.add(listener)
    }

    fn remove_gathering_listener(&self, id: ListenerId) -> bool {
        self.gathering.remove(id)
    }

    fn on_track(&self, listener: TrackListener) {
        let listener: Arc<dyn Fn(RemoteTrack) + Send + Sync> = Arc::from(listener);
        self.pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let kind = match track.kind() {
                RTPCodecType::Audio => MediaKind::Audio,
                _ => MediaKind::Video,
            };
            listener(RemoteTrack {
                id: track.id(),
                stream_id: track.stream_id(),
                kind,
            });
            Box::pin(async {})
        }));
    }

    fn on_connection_state_change(&self, listener: ConnectionStateListener) {
        let listener: Arc<dyn Fn(PeerConnectionState) + Send + Sync> = Arc::from(listener);
        self.pc
            .on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                listener(connection_state_from_rtc(state));
                Box::pin(async {})
            }));
    }

    async fn close(&self) -> Result<()> {
        self.gathering.clear();
        self.pc
            .close()
            .await
            .map_err(|e| Error::capability(format!("failed to close peer connection: {e}")))
    }
}

fn ice_servers(urls: &[String]) -> Vec<RTCIceServer> {
    if urls.is_empty() {
        return Vec::new();
    }
    vec![RTCIceServer {
        urls: urls.to_vec(),
        ..Default::default()
    }]
}

fn kind_to_rtc(kind: MediaKind) -> RTPCodecType {
    match kind {
        MediaKind::Audio => RTPCodecType::Audio,
        MediaKind::Video => RTPCodecType::Video,
    }
}

fn direction_to_rtc(direction: TransceiverDirection) -> RTCRtpTransceiverDirection {
    match direction {
        TransceiverDirection::SendRecv => RTCRtpTransceiverDirection::Sendrecv,
        TransceiverDirection::SendOnly => RTCRtpTransceiverDirection::Sendonly,
        TransceiverDirection::RecvOnly => RTCRtpTransceiverDirection::Recvonly,
        TransceiverDirection::Inactive => RTCRtpTransceiverDirection::Inactive,
    }
}

fn gathering_from_gatherer(state: RTCIceGathererState) -> Option<GatheringState> {
    match state {
        RTCIceGathererState::New => Some(GatheringState::New),
        RTCIceGathererState::Gathering => Some(GatheringState::Gathering),
        RTCIceGathererState::Complete => Some(GatheringState::Complete),
        _ => None,
    }
}

fn connection_state_from_rtc(state: RTCPeerConnectionState) -> PeerConnectionState {
    match state {
        RTCPeerConnectionState::Connecting => PeerConnectionState::Connecting,
        RTCPeerConnectionState::Connected => PeerConnectionState::Connected,
        RTCPeerConnectionState::Disconnected => PeerConnectionState::Disconnected,
        RTCPeerConnectionState::Failed => PeerConnectionState::Failed,
        RTCPeerConnectionState::Closed => PeerConnectionState::Closed,
        _ => PeerConnectionState::New,
    }
}

fn description_to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription> {
    let sdp = desc.sdp().to_string();
    let parsed = match desc.sdp_type() {
        SdpType::Offer => RTCSessionDescription::offer(sdp),
        SdpType::Answer => RTCSessionDescription::answer(sdp),
    };
    parsed.map_err(|e| Error::capability(format!("invalid session description: {e}")))
}

fn description_from_rtc(desc: RTCSessionDescription) -> Result<SessionDescription> {
    match desc.sdp_type {
        RTCSdpType::Offer => Ok(SessionDescription::offer(desc.sdp)),
        RTCSdpType::Answer => Ok(SessionDescription::answer(desc.sdp)),
        other => Err(Error::protocol(format!(
            "unsupported session description type: {other:?}"
        ))),
    }
}
