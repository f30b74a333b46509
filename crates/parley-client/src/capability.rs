//! The peer-connection capability consumed by the negotiation engine.
//!
//! The engine never talks to a media stack directly. It drives whatever
//! implements [`PeerConnection`], which lets the same state machine run over
//! webrtc-rs in production and over an in-memory double in tests.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use parley_common::{Result, SessionDescription};

/// Offer/answer SDP dialect. Only unified plan is negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SdpSemantics {
    #[default]
    UnifiedPlan,
}

/// Settings handed to the factory when a call starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtcConfig {
    pub sdp_semantics: SdpSemantics,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ice_servers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    #[default]
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "audio" => Ok(MediaKind::Audio),
            "video" => Ok(MediaKind::Video),
            other => Err(format!("unknown media kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransceiverDirection {
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

/// Local connectivity-candidate collection progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatheringState {
    New,
    Gathering,
    Complete,
}

/// Aggregate transport state as reported by the peer-connection engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Handle to an inbound media track, passed on to the rendering surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub id: String,
    pub stream_id: String,
    pub kind: MediaKind,
}

pub type GatheringListener = Box<dyn Fn(GatheringState) + Send + Sync>;
pub type TrackListener = Box<dyn Fn(RemoteTrack) + Send + Sync>;
pub type ConnectionStateListener = Box<dyn Fn(PeerConnectionState) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn add_transceiver(&self, kind: MediaKind, direction: TransceiverDirection)
        -> Result<()>;

    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    /// Current local description, including any candidates gathered so far.
    async fn local_description(&self) -> Option<SessionDescription>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    fn gathering_state(&self) -> GatheringState;

    fn add_gathering_listener(&self, listener: GatheringListener) -> ListenerId;

    /// Returns `false` if the listener was not registered.
    fn remove_gathering_listener(&self, id: ListenerId) -> bool;

    /// Replace the inbound-track observer.
    fn on_track(&self, listener: TrackListener);

    /// Replace the connection-state observer.
    fn on_connection_state_change(&self, listener: ConnectionStateListener);

    /// Close the connection. Pending gathering listeners are dropped.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    async fn create(&self, config: &RtcConfig) -> Result<Arc<dyn PeerConnection>>;
}

type SharedListener<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Removable set of callbacks for one event kind.
///
/// `emit` calls a snapshot of the registered listeners with no lock held, so
/// a listener may add or remove listeners without deadlocking. Each listener
/// is checked against the registry right before it runs: once `remove` or
/// `clear` returns, it is not called again, though a call already under way
/// on another thread may still finish.
pub struct ListenerSet<T> {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, SharedListener<T>)>>,
}

impl<T> Default for ListenerSet<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Clone> ListenerSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Box<dyn Fn(T) + Send + Sync>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::from(listener)));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut guard = self.lock();
        let before = guard.len();
        guard.retain(|(existing, _)| *existing != id);
        guard.len() != before
    }

    pub fn emit(&self, value: T) {
        let snapshot: Vec<(ListenerId, SharedListener<T>)> = self.lock().clone();
        for (id, listener) in snapshot {
            if !self.contains(id) {
                continue;
            }
            listener(value.clone());
        }
    }

    fn contains(&self, id: ListenerId) -> bool {
        self.lock().iter().any(|(existing, _)| *existing == id)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, SharedListener<T>)>> {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
