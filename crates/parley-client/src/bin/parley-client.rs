use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use parley_common::helpers::env_parse;

use parley_client::{
    EngineConfig, EngineEvent, HttpExchange, HubExchange, MediaKind, NegotiationEngine,
    NegotiationState, OfferExchange, WebRtcFactory, DEFAULT_OFFER_ENDPOINT,
};

#[derive(Parser, Debug)]
#[command(name = "parley-client")]
#[command(about = "Negotiate a receive-only media session with a remote answerer")]
struct Args {
    /// Offer/answer HTTP endpoint
    #[arg(long, env = "PARLEY_ENDPOINT", default_value = DEFAULT_OFFER_ENDPOINT)]
    endpoint: String,

    /// Exchange the offer through a relay hub websocket instead of HTTP
    #[arg(long, env = "PARLEY_HUB_URL")]
    hub: Option<String>,

    /// Remote media source to request
    #[arg(long, env = "PARLEY_DEVICE_ID", default_value = parley_client::types::DEFAULT_DEVICE_ID)]
    device_id: String,

    /// Media kind to receive (video or audio)
    #[arg(long, default_value_t = MediaKind::Video)]
    kind: MediaKind,

    /// ICE server URL (repeatable)
    #[arg(long = "ice-server", value_name = "URL")]
    ice_servers: Vec<String>,

    /// Seconds to wait for candidate gathering (0 waits forever)
    #[arg(long, default_value_t = 10)]
    gather_timeout_secs: u64,

    /// Seconds to wait for the answer (0 waits forever)
    #[arg(long, default_value_t = 10)]
    exchange_timeout_secs: u64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl Args {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            device_id: self.device_id.clone(),
            media_kind: self.kind,
            gather_timeout: timeout_from_secs(self.gather_timeout_secs),
            exchange_timeout: timeout_from_secs(self.exchange_timeout_secs),
            stop_grace: Duration::from_millis(env_parse("PARLEY_STOP_GRACE_MS", 500)),
            ice_servers: self.ice_servers.clone(),
        }
    }

    fn exchange(&self) -> Arc<dyn OfferExchange> {
        match &self.hub {
            Some(url) => {
                info!("exchanging offer through hub {}", url);
                Arc::new(HubExchange::new(url.clone()))
            }
            None => {
                info!("exchanging offer with {}", self.endpoint);
                Arc::new(HttpExchange::new(self.endpoint.clone()))
            }
        }
    }
}

async fn log_events(mut events: mpsc::UnboundedReceiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::StateChanged(state) => info!("state: {}", state),
            EngineEvent::Track(track) => info!(
                "receiving {} track {} from stream {}",
                track.kind, track.id, track.stream_id
            ),
            EngineEvent::Failed(reason) => error!("call failed: {}", reason),
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    parley_common::init_tracing_with_default(&args.log_level);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let engine = NegotiationEngine::new(
        Arc::new(WebRtcFactory),
        args.exchange(),
        args.engine_config(),
    )
    .with_events(events_tx);
    let logger = tokio::spawn(log_events(events_rx));
    let mut state_rx = engine.subscribe();

    let started = tokio::select! {
        res = engine.start() => res,
        _ = shutdown_signal() => {
            engine.stop().await;
            return Ok(());
        }
    };

    if let Err(err) = started {
        engine.stop().await;
        logger.abort();
        return Err(err.into());
    }

    tokio::select! {
        _ = shutdown_signal() => {}
        _ = state_rx.wait_for(|state| *state == NegotiationState::Failed) => {
            warn!("peer connection failed");
        }
    }

    engine.stop().await;
    info!("client stopped");
    Ok(())
}
