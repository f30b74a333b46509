//! Connection registry and broadcast fan-out.
//!
//! The hub never looks inside a frame. Every frame received from one
//! connection is offered to every other connection that is still `Open`;
//! delivery is best-effort and at most once per recipient.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_OUTBOX_CAPACITY: usize = 128;

/// Identity of one relay participant.
pub type ConnectionId = Uuid;

/// One relayed message, forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for Frame {
    fn from(text: &str) -> Self {
        Frame::Text(text.to_string())
    }
}

/// Connection liveness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Open,
            1 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Open => write!(f, "OPEN"),
            ConnectionState::Closing => write!(f, "CLOSING"),
            ConnectionState::Closed => write!(f, "CLOSED"),
        }
    }
}

#[derive(Debug, Clone)]
struct Liveness(Arc<AtomicU8>);

impl Liveness {
    fn open() -> Self {
        Self(Arc::new(AtomicU8::new(ConnectionState::Open as u8)))
    }

    fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move forward only: Open -> Closing -> Closed.
    fn advance(&self, next: ConnectionState) {
        self.0.fetch_max(next as u8, Ordering::AcqRel);
    }
}

struct Peer {
    liveness: Liveness,
    tx: mpsc::Sender<Frame>,
}

/// Transport-side handle for a registered connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    liveness: Liveness,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.liveness.get()
    }

    /// Stop receiving broadcasts while the transport tears down.
    pub fn mark_closing(&self) {
        self.liveness.advance(ConnectionState::Closing);
    }
}

/// A single broadcast domain.
///
/// Cloning is cheap and every clone shares the same registry.
#[derive(Clone)]
pub struct Hub {
    peers: Arc<RwLock<HashMap<ConnectionId, Peer>>>,
    outbox_capacity: usize,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOX_CAPACITY)
    }
}

impl Hub {
    pub fn new(outbox_capacity: usize) -> Self {
        Self {
            peers: Arc::new(RwLock::new(HashMap::new())),
            outbox_capacity: outbox_capacity.max(1),
        }
    }

    /// Register a new connection. The receiver yields every frame relayed to it.
    pub async fn connect(&self) -> (ConnectionHandle, mpsc::Receiver<Frame>) {
        let id = Uuid::new_v4();
        let liveness = Liveness::open();
        let (tx, rx) = mpsc::channel(self.outbox_capacity);

        let total = {
            let mut guard = self.peers.write().await;
            guard.insert(
                id,
                Peer {
                    liveness: liveness.clone(),
                    tx,
                },
            );
            guard.len()
        };
        info!("connection {} registered ({} active)", id, total);

        (ConnectionHandle { id, liveness }, rx)
    }

    /// Forward `frame` to every open connection except `from`.
    ///
    /// Returns how many recipients accepted the frame. Per-recipient failures
    /// are logged and skipped; a recipient whose queue is gone is dropped.
    pub async fn relay(&self, from: ConnectionId, frame: Frame) -> usize {
        let recipients: Vec<(ConnectionId, mpsc::Sender<Frame>, Liveness)> = {
            let guard = self.peers.read().await;
            guard
                .iter()
                .filter(|(id, peer)| **id != from && peer.liveness.get() == ConnectionState::Open)
                .map(|(id, peer)| (*id, peer.tx.clone(), peer.liveness.clone()))
                .collect()
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, tx, liveness) in recipients {
            match tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("outbox full for connection {}, dropping message", id);
                }
                Err(TrySendError::Closed(_)) => {
                    warn!("connection {} closed during relay", id);
                    liveness.advance(ConnectionState::Closed);
                    dead.push(id);
                }
            }
        }

        if !dead.is_empty() {
            let mut guard = self.peers.write().await;
            for id in dead {
                guard.remove(&id);
            }
        }

        debug!(
            "relayed {} byte message from {} to {} recipient(s)",
            frame.len(),
            from,
            delivered
        );
        delivered
    }

    /// Remove a connection from the active set.
    ///
    /// Returns `false` when it was already gone.
    pub async fn disconnect(&self, id: ConnectionId) -> bool {
        let removed = self.peers.write().await.remove(&id);
        match removed {
            Some(peer) => {
                peer.liveness.advance(ConnectionState::Closed);
                info!("connection {} removed", id);
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }
}
