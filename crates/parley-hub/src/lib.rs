//! Parley relay hub.
//!
//! A protocol-agnostic broadcast relay: every websocket message received from
//! one participant is forwarded, unparsed, to every other open participant.

#![forbid(unsafe_code)]

pub mod config;
pub mod hub;
pub mod signal;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use parley_common::HubHealth;

pub use config::HubConfig;
pub use hub::{ConnectionHandle, ConnectionId, ConnectionState, Frame, Hub};

#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub config: Arc<HubConfig>,
}

impl axum::extract::FromRef<AppState> for Hub {
    fn from_ref(state: &AppState) -> Self {
        state.hub.clone()
    }
}

async fn health(State(hub): State<Hub>) -> impl IntoResponse {
    Json(HubHealth {
        active_connections: hub.len().await,
    })
}

fn build_cors_layer(config: &HubConfig) -> CorsLayer {
    let allow_origin = if config.cors_origins.is_empty() {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("ignoring invalid CORS origin {:?}", origin);
                    None
                }
            })
            .collect();
        if origins.is_empty() {
            tracing::warn!(
                "no valid CORS origins configured; cross-origin browser access will be blocked"
            );
        }
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Build the hub's HTTP surface around an existing registry.
pub fn router(hub: Hub, config: HubConfig) -> Router {
    let cors = build_cors_layer(&config);
    let state = AppState {
        hub,
        config: Arc::new(config),
    };

    Router::new()
        .route("/", get(|| async { "Parley Hub Online" }))
        .route("/health", get(health))
        .route("/ws", get(signal::ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the hub on an already-bound listener until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    hub: Hub,
    config: HubConfig,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(hub, config);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

/// Websocket URL clients should use for a bound address.
pub fn ws_url_for_bound_addr(bound_addr: SocketAddr) -> String {
    let host = if bound_addr.ip().is_unspecified() {
        "127.0.0.1".to_string()
    } else {
        bound_addr.ip().to_string()
    };
    format!("ws://{}:{}/ws", host, bound_addr.port())
}
