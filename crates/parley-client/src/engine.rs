//! Offerer-side negotiation state machine.
//!
//! One [`NegotiationEngine`] drives at most one call at a time: it creates a
//! receive-only peer connection, waits for candidate gathering, trades the
//! offer for an answer through an [`OfferExchange`] and then follows the
//! connection state reported by the capability.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use parley_common::{Error, OfferRequest, Result};

use crate::capability::{
    PeerConnection, PeerConnectionFactory, PeerConnectionState, TransceiverDirection,
};
use crate::exchange::OfferExchange;
use crate::gather::wait_for_gathering_complete;
use crate::types::{EngineConfig, EngineEvent, NegotiationState};

/// State and event sinks shared with capability callbacks.
struct Shared {
    state: watch::Sender<NegotiationState>,
    events: OnceLock<mpsc::UnboundedSender<EngineEvent>>,
}

impl Shared {
    fn emit(&self, event: EngineEvent) {
        if let Some(tx) = self.events.get() {
            let _ = tx.send(event);
        }
    }

    /// Move to `next` if the call is still live and the current state passes `allowed`.
    fn transition_if(
        &self,
        live: &AtomicBool,
        next: NegotiationState,
        allowed: impl Fn(NegotiationState) -> bool,
    ) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if !live.load(Ordering::SeqCst) || !allowed(*state) || *state == next {
                return false;
            }
            *state = next;
            true
        });
        if changed {
            info!("negotiation state -> {}", next);
            self.emit(EngineEvent::StateChanged(next));
        }
        changed
    }

    /// Forward step of the negotiation. `Failed` is terminal for the call.
    fn transition(&self, live: &AtomicBool, next: NegotiationState) -> bool {
        self.transition_if(live, next, |state| state != NegotiationState::Failed)
    }

    fn fail(&self, live: &AtomicBool, err: &Error) {
        if self.transition_if(live, NegotiationState::Failed, |_| true) {
            warn!("negotiation failed: {}", err);
            self.emit(EngineEvent::Failed(err.to_string()));
        }
    }

    fn reset_idle(&self) {
        let changed = self.state.send_if_modified(|state| {
            if *state == NegotiationState::Idle {
                return false;
            }
            *state = NegotiationState::Idle;
            true
        });
        if changed {
            info!("negotiation state -> {}", NegotiationState::Idle);
            self.emit(EngineEvent::StateChanged(NegotiationState::Idle));
        }
    }
}

struct ActiveCall {
    id: u64,
    /// Cleared when the call is superseded or stopped; gates every callback.
    live: Arc<AtomicBool>,
    pc: Option<Arc<dyn PeerConnection>>,
    /// Dropping the sender aborts the in-flight `start`.
    cancel: Option<oneshot::Sender<()>>,
}

impl ActiveCall {
    fn retire(&mut self) -> Option<Arc<dyn PeerConnection>> {
        self.live.store(false, Ordering::SeqCst);
        self.cancel.take();
        self.pc.take()
    }
}

pub struct NegotiationEngine {
    factory: Arc<dyn PeerConnectionFactory>,
    exchange: Arc<dyn OfferExchange>,
    config: EngineConfig,
    shared: Arc<Shared>,
    call: Mutex<Option<ActiveCall>>,
    next_call: AtomicU64,
}

impl NegotiationEngine {
    pub fn new(
        factory: Arc<dyn PeerConnectionFactory>,
        exchange: Arc<dyn OfferExchange>,
        config: EngineConfig,
    ) -> Self {
        let (state, _) = watch::channel(NegotiationState::Idle);
        Self {
            factory,
            exchange,
            config,
            shared: Arc::new(Shared {
                state,
                events: OnceLock::new(),
            }),
            call: Mutex::new(None),
            next_call: AtomicU64::new(1),
        }
    }

    /// Route state changes, tracks and failures to `tx`.
    ///
    /// Only the first sink is kept; later ones are dropped with a warning.
    pub fn with_events(self, tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        if self.shared.events.set(tx).is_err() {
            warn!("engine event sink already set; ignoring the new one");
        }
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> NegotiationState {
        *self.shared.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<NegotiationState> {
        self.shared.state.subscribe()
    }

    /// Negotiate a new call, replacing any existing one.
    ///
    /// Returns once the answer has been applied. Reaching `Connected` is
    /// reported later through the state channel. A concurrent [`stop`] or
    /// `start` makes this return [`Error::Cancelled`].
    ///
    /// [`stop`]: NegotiationEngine::stop
    pub async fn start(&self) -> Result<()> {
        let (id, live, cancel_rx, prior) = self.begin_call();
        if let Some(pc) = prior {
            debug!("closing previous peer connection");
            if let Err(e) = pc.close().await {
                warn!("failed to close previous peer connection: {}", e);
            }
        }
        self.shared.reset_idle();
        info!("starting negotiation {} for {}", id, self.config.device_id);

        // A failure reported by the connection ends the negotiation too.
        let outcome = tokio::select! {
            res = self.negotiate(id, &live) => res,
            _ = cancel_rx => Err(Error::Cancelled),
            _ = until_failed(self.subscribe()) => Err(Error::capability("peer connection failed")),
        };

        match outcome {
            Ok(()) => Ok(()),
            Err(err) if matches!(err, Error::Cancelled) || !live.load(Ordering::SeqCst) => {
                debug!("negotiation {} cancelled", id);
                Err(Error::Cancelled)
            }
            Err(err) => {
                self.shared.fail(&live, &err);
                Err(err)
            }
        }
    }

    /// Tear down the current call, if any, and return to `Idle`.
    ///
    /// Callbacks stop being forwarded at once; the peer connection is closed
    /// after the configured grace delay.
    pub async fn stop(&self) {
        let call = self.lock_call().take();
        let Some(mut call) = call else {
            self.shared.reset_idle();
            return;
        };

        info!("stopping negotiation {}", call.id);
        let pc = call.retire();
        tokio::time::sleep(self.config.stop_grace).await;
        if let Some(pc) = pc {
            if let Err(e) = pc.close().await {
                warn!("failed to close peer connection: {}", e);
            }
        }
        self.shared.reset_idle();
    }

    async fn negotiate(&self, id: u64, live: &Arc<AtomicBool>) -> Result<()> {
        let pc = self.factory.create(&self.config.rtc_config()).await?;
        if !self.attach(id, pc.clone()) {
            let _ = pc.close().await;
            return Err(Error::Cancelled);
        }
        self.wire_callbacks(pc.as_ref(), live);

        pc.add_transceiver(self.config.media_kind, TransceiverDirection::RecvOnly)
            .await?;
        let offer = pc.create_offer().await?;
        pc.set_local_description(offer).await?;
        self.shared.transition(live, NegotiationState::OfferCreated);

        self.shared.transition(live, NegotiationState::Gathering);
        with_timeout(
            self.config.gather_timeout,
            "ICE gathering",
            wait_for_gathering_complete(pc.as_ref()),
        )
        .await?;

        let local = pc
            .local_description()
            .await
            .ok_or_else(|| Error::capability("no local description after gathering"))?;
        let request = OfferRequest::new(&local, self.config.device_id.clone());
        self.shared.transition(live, NegotiationState::OfferSent);

        let reply = with_timeout(
            self.config.exchange_timeout,
            "offer exchange",
            self.exchange.exchange(request),
        )
        .await?;
        let answer = reply.expect_answer()?;
        pc.set_remote_description(answer).await?;

        // The connection may already have reported Connected.
        self.shared
            .transition_if(live, NegotiationState::AnswerReceived, |state| {
                state == NegotiationState::OfferSent
            });
        Ok(())
    }

    fn wire_callbacks(&self, pc: &dyn PeerConnection, live: &Arc<AtomicBool>) {
        let shared = self.shared.clone();
        let flag = live.clone();
        pc.on_track(Box::new(move |track| {
            if !flag.load(Ordering::SeqCst) {
                return;
            }
            info!("remote {} track {} (stream {})", track.kind, track.id, track.stream_id);
            shared.emit(EngineEvent::Track(track));
        }));

        let shared = self.shared.clone();
        let flag = live.clone();
        pc.on_connection_state_change(Box::new(move |state| {
            debug!("peer connection state: {:?}", state);
            match state {
                PeerConnectionState::Connected => {
                    shared.transition_if(&flag, NegotiationState::Connected, |current| {
                        matches!(
                            current,
                            NegotiationState::OfferSent | NegotiationState::AnswerReceived
                        )
                    });
                }
                PeerConnectionState::Failed => {
                    shared.fail(&flag, &Error::capability("peer connection failed"));
                }
                _ => {}
            }
        }));
    }

    /// Register a new call, retiring the previous one. Returns the previous
    /// call's peer connection so the caller can close it outside the lock.
    fn begin_call(
        &self,
    ) -> (
        u64,
        Arc<AtomicBool>,
        oneshot::Receiver<()>,
        Option<Arc<dyn PeerConnection>>,
    ) {
        let id = self.next_call.fetch_add(1, Ordering::Relaxed);
        let live = Arc::new(AtomicBool::new(true));
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let mut slot = self.lock_call();
        let prior = slot.as_mut().and_then(ActiveCall::retire);
        *slot = Some(ActiveCall {
            id,
            live: live.clone(),
            pc: None,
            cancel: Some(cancel_tx),
        });
        (id, live, cancel_rx, prior)
    }

    fn attach(&self, id: u64, pc: Arc<dyn PeerConnection>) -> bool {
        match self.lock_call().as_mut() {
            Some(call) if call.id == id => {
                call.pc = Some(pc);
                true
            }
            _ => false,
        }
    }

    fn lock_call(&self) -> MutexGuard<'_, Option<ActiveCall>> {
        self.call.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn until_failed(mut state: watch::Receiver<NegotiationState>) {
    if state
        .wait_for(|s| *s == NegotiationState::Failed)
        .await
        .is_err()
    {
        std::future::pending::<()>().await;
    }
}

async fn with_timeout<T>(
    limit: Option<Duration>,
    what: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::timeout(format!("{what} did not finish within {limit:?}")))?,
        None => fut.await,
    }
}
