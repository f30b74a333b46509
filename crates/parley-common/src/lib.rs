//! Shared utilities for Parley: wire records, logging, error types.
//!
//! This crate provides common infrastructure used by the relay hub and the
//! negotiation client.

#![forbid(unsafe_code)]

pub mod error;
pub mod helpers;
pub mod protocol;

pub use error::{Error, Result};
pub use protocol::*;

/// Initialize tracing with a specific default level.
///
/// `RUST_LOG` overrides the default when set.
/// `PARLEY_LOG_TARGET=0` hides module targets in log lines.
pub fn init_tracing_with_default(default_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(helpers::env_bool("PARLEY_LOG_TARGET", true))
        .init();
}
