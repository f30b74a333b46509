//! In-memory capability and exchange doubles for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use parley_common::{Error, OfferRequest, Result, SessionDescription};

use crate::capability::{
    ConnectionStateListener, GatheringListener, GatheringState, ListenerId, ListenerSet,
    MediaKind, PeerConnection, PeerConnectionFactory, PeerConnectionState, RemoteTrack, RtcConfig,
    TrackListener, TransceiverDirection,
};
use crate::exchange::OfferExchange;

pub const FAKE_OFFER_SDP: &str = "v=0\r\no=- 4611 2 IN IP4 127.0.0.1\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\n";
pub const FAKE_CANDIDATE: &str = "a=candidate:1 1 udp 2130706431 192.0.2.10 50000 typ host\r\n";

pub struct FakePeer {
    gathering: Mutex<GatheringState>,
    listeners: ListenerSet<GatheringState>,
    track_listener: Mutex<Option<TrackListener>>,
    state_listener: Mutex<Option<ConnectionStateListener>>,
    pub transceivers: Mutex<Vec<(MediaKind, TransceiverDirection)>>,
    pub local: Mutex<Option<SessionDescription>>,
    pub remote: Mutex<Option<SessionDescription>>,
    pub listener_adds: AtomicUsize,
    pub listener_removes: AtomicUsize,
    pub listener_calls: Arc<AtomicUsize>,
    pub closed: AtomicBool,
    pub closed_at: Mutex<Option<Instant>>,
}

impl FakePeer {
    pub fn new(initial: GatheringState) -> Arc<Self> {
        Arc::new(Self {
            gathering: Mutex::new(initial),
            listeners: ListenerSet::new(),
            track_listener: Mutex::new(None),
            state_listener: Mutex::new(None),
            transceivers: Mutex::new(Vec::new()),
            local: Mutex::new(None),
            remote: Mutex::new(None),
            listener_adds: AtomicUsize::new(0),
            listener_removes: AtomicUsize::new(0),
            listener_calls: Arc::new(AtomicUsize::new(0)),
            closed: AtomicBool::new(false),
            closed_at: Mutex::new(None),
        })
    }

    pub fn set_gathering(&self, state: GatheringState) {
        *self.gathering.lock().unwrap() = state;
        self.listeners.emit(state);
    }

    pub fn active_listeners(&self) -> usize {
        self.listeners.len()
    }

    pub async fn wait_for_listeners(&self, count: usize) {
        for _ in 0..500 {
            if self.listeners.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("listener never registered");
    }

    pub fn emit_track(&self, track: RemoteTrack) {
        if let Some(listener) = self.track_listener.lock().unwrap().as_ref() {
            listener(track);
        }
    }

    pub fn emit_connection_state(&self, state: PeerConnectionState) {
        if let Some(listener) = self.state_listener.lock().unwrap().as_ref() {
            listener(state);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerConnection for FakePeer {
    async fn add_transceiver(
        &self,
        kind: MediaKind,
        direction: TransceiverDirection,
    ) -> Result<()> {
        self.transceivers.lock().unwrap().push((kind, direction));
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        if self.is_closed() {
            return Err(Error::capability("connection closed"));
        }
        Ok(SessionDescription::offer(FAKE_OFFER_SDP))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        *self.local.lock().unwrap() = Some(desc);
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let local = self.local.lock().unwrap().clone()?;
        if *self.gathering.lock().unwrap() == GatheringState::Complete {
            let enriched = format!("{}{}", local.sdp(), FAKE_CANDIDATE);
            return Some(SessionDescription::new(local.sdp_type(), enriched));
        }
        Some(local)
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        *self.remote.lock().unwrap() = Some(desc);
        Ok(())
    }

    fn gathering_state(&self) -> GatheringState {
        *self.gathering.lock().unwrap()
    }

    fn add_gathering_listener(&self, listener: GatheringListener) -> ListenerId {
        self.listener_adds.fetch_add(1, Ordering::SeqCst);
        let calls = self.listener_calls.clone();
        self.listeners.add(Box::new(move |state| {
            calls.fetch_add(1, Ordering::SeqCst);
            listener(state);
        }))
    }

    fn remove_gathering_listener(&self, id: ListenerId) -> bool {
        let removed = self.listeners.remove(id);
        if removed {
            self.listener_removes.fetch_add(1, Ordering::SeqCst);
        }
        removed
    }

    fn on_track(&self, listener: TrackListener) {
        *self.track_listener.lock().unwrap() = Some(listener);
    }

    fn on_connection_state_change(&self, listener: ConnectionStateListener) {
        *self.state_listener.lock().unwrap() = Some(listener);
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        *self.closed_at.lock().unwrap() = Some(Instant::now());
        self.listeners.clear();
        Ok(())
    }
}

pub struct FakeFactory {
    initial: GatheringState,
    fail: bool,
    pub peers: Mutex<Vec<Arc<FakePeer>>>,
    pub configs: Mutex<Vec<RtcConfig>>,
}

impl FakeFactory {
    pub fn new(initial: GatheringState) -> Arc<Self> {
        Arc::new(Self {
            initial,
            fail: false,
            peers: Mutex::new(Vec::new()),
            configs: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            initial: GatheringState::New,
            fail: true,
            peers: Mutex::new(Vec::new()),
            configs: Mutex::new(Vec::new()),
        })
    }

    pub fn peer(&self, index: usize) -> Arc<FakePeer> {
        self.peers.lock().unwrap()[index].clone()
    }

    pub fn created(&self) -> usize {
        self.peers.lock().unwrap().len()
    }
}

#[async_trait]
impl PeerConnectionFactory for FakeFactory {
    async fn create(&self, config: &RtcConfig) -> Result<Arc<dyn PeerConnection>> {
        self.configs.lock().unwrap().push(config.clone());
        if self.fail {
            return Err(Error::capability("media engine unavailable"));
        }
        let peer = FakePeer::new(self.initial);
        self.peers.lock().unwrap().push(peer.clone());
        Ok(peer)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Answer,
    Offer,
    Unreachable,
    Hang,
}

pub struct FakeExchange {
    reply: Reply,
    pub requests: Mutex<Vec<OfferRequest>>,
}

impl FakeExchange {
    pub fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl OfferExchange for FakeExchange {
    async fn exchange(&self, offer: OfferRequest) -> Result<SessionDescription> {
        self.requests.lock().unwrap().push(offer);
        match self.reply {
            Reply::Answer => Ok(SessionDescription::answer("v=0\r\no=- 99 2 IN IP4 192.0.2.20\r\n")),
            Reply::Offer => Ok(SessionDescription::offer("v=0\r\n")),
            Reply::Unreachable => Err(Error::transport("connection refused")),
            Reply::Hang => std::future::pending().await,
        }
    }
}
