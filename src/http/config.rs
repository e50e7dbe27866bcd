//! Pipeline tunables.
//!
//! Defaults match what the engine uses when no configuration is supplied.
//! Every field is optional when loading from JSON.

use crate::base::neterror::NetError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration options for a [`Pipeline`](crate::http::pipeline::Pipeline).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// User-Agent sent when the request does not set one.
    pub user_agent: String,

    /// Maximum bytes pulled from a body source per write.
    pub send_chunk_size: usize,

    /// Maximum bytes read from the transport per call.
    pub recv_chunk_size: usize,

    /// Longest status or header line accepted without a terminator.
    pub max_line_length: usize,

    /// Bodies larger than this disable no-delay for the transfer.
    /// Roughly one network segment.
    pub nodelay_threshold: u64,

    /// Backoffs at least this long are logged at info level.
    pub backoff_notice_threshold_secs: u64,

    /// Connect timeout used by the async driver.
    pub connect_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("pipenet/", env!("CARGO_PKG_VERSION")).to_string(),
            send_chunk_size: 64 * 1024,
            recv_chunk_size: 64 * 1024,
            max_line_length: 8192,
            nodelay_threshold: 536,
            backoff_notice_threshold_secs: 30,
            connect_timeout_secs: 15,
        }
    }
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self, NetError> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            tracing::warn!(error = %e, "invalid pipeline configuration");
            NetError::InvalidArgument
        })?;
        if config.send_chunk_size == 0 || config.recv_chunk_size == 0 {
            tracing::warn!("chunk sizes must be non-zero");
            return Err(NetError::InvalidArgument);
        }
        Ok(config)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn backoff_notice_threshold(&self) -> Duration {
        Duration::from_secs(self.backoff_notice_threshold_secs)
    }
}
