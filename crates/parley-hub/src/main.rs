//! Parley relay hub server.

#![forbid(unsafe_code)]

use std::io::ErrorKind;
use std::net::SocketAddr;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use parley_common::helpers::split_list;
use parley_hub::{config, Hub, HubConfig};

#[derive(Parser, Debug)]
#[command(name = "parley-hub")]
#[command(about = "Parley relay hub - broadcasts signaling messages between peers")]
struct Args {
    /// Websocket listen address
    #[arg(long, env = "PARLEY_HUB_LISTEN", default_value = config::DEFAULT_LISTEN)]
    listen: SocketAddr,

    /// Per-connection outbound queue depth
    #[arg(long, env = "PARLEY_HUB_OUTBOX_CAPACITY", default_value_t = parley_hub::hub::DEFAULT_OUTBOX_CAPACITY)]
    outbox_capacity: usize,

    /// Largest accepted websocket message, in bytes
    #[arg(long, env = "PARLEY_HUB_MAX_MESSAGE_BYTES", default_value_t = config::DEFAULT_MAX_MESSAGE_BYTES)]
    max_message_bytes: usize,

    /// Comma-separated list of allowed browser origins (empty allows any)
    #[arg(long, env = "PARLEY_HUB_CORS_ORIGINS", default_value = "")]
    cors_origins: String,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn hub_config(&self) -> HubConfig {
        HubConfig {
            listen: self.listen,
            outbox_capacity: self.outbox_capacity,
            max_message_bytes: self.max_message_bytes,
            cors_origins: split_list(&self.cors_origins),
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

    let config = args.hub_config();
    config.validate()?;

    let listener = match TcpListener::bind(config.listen).await {
        Ok(listener) => listener,
        Err(err) if err.kind() == ErrorKind::AddrInUse => {
            return Err(anyhow::anyhow!(
                "hub address {} is already in use",
                config.listen
            ));
        }
        Err(err) => return Err(err.into()),
    };
    let bound_addr = listener.local_addr()?;
    info!("hub listening on {}", bound_addr);
    info!(
        "hub signaling url {}",
        parley_hub::ws_url_for_bound_addr(bound_addr)
    );

    let hub = Hub::new(config.outbox_capacity);
    parley_hub::serve(listener, hub, config, shutdown_signal()).await?;

    info!("hub stopped");
    Ok(())
}
