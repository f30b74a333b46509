//! One-shot wait for ICE gathering to finish.

use std::sync::{Mutex, PoisonError};

use tokio::sync::oneshot;
use tracing::debug;

use parley_common::{Error, Result};

use crate::capability::{GatheringState, ListenerId, PeerConnection};

/// Deregisters a gathering listener exactly once, on release or on drop.
struct ListenerGuard<'a> {
    pc: &'a dyn PeerConnection,
    id: Option<ListenerId>,
}

impl ListenerGuard<'_> {
    fn release(&mut self) {
        if let Some(id) = self.id.take() {
            self.pc.remove_gathering_listener(id);
        }
    }
}

impl Drop for ListenerGuard<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Resolve once `pc` reports [`GatheringState::Complete`].
///
/// Returns immediately, without registering anything, when gathering is
/// already complete. Dropping the returned future removes the listener.
pub async fn wait_for_gathering_complete(pc: &dyn PeerConnection) -> Result<()> {
    if pc.gathering_state() == GatheringState::Complete {
        return Ok(());
    }

    let (tx, rx) = oneshot::channel::<()>();
    let tx = Mutex::new(Some(tx));
    let id = pc.add_gathering_listener(Box::new(move |state| {
        if state != GatheringState::Complete {
            return;
        }
        let sender = tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }));
    let mut guard = ListenerGuard { pc, id: Some(id) };

    // Completion may have landed between the first check and registration.
    if pc.gathering_state() == GatheringState::Complete {
        guard.release();
        return Ok(());
    }

    debug!("waiting for ICE gathering to complete");
    let outcome = rx.await;
    guard.release();
    outcome.map_err(|_| Error::capability("peer connection closed while gathering candidates"))
}
