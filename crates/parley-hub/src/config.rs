use std::net::SocketAddr;

use parley_common::{Error, Result};

use crate::hub::DEFAULT_OUTBOX_CAPACITY;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024;

/// Runtime settings for one hub instance.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub listen: SocketAddr,
    /// Per-connection outbound queue depth; frames beyond it are dropped.
    pub outbox_capacity: usize,
    pub max_message_bytes: usize,
    /// Allowed browser origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            cors_origins: Vec::new(),
        }
    }
}

impl HubConfig {
    pub fn validate(&self) -> Result<()> {
        if self.outbox_capacity == 0 {
            return Err(Error::config("outbox capacity must be at least 1"));
        }
        if self.max_message_bytes == 0 {
            return Err(Error::config("max message size must be at least 1 byte"));
        }
        Ok(())
    }
}
