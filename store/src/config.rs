use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const fn default_read_timeout_ms() -> u64 {
    5_000
}

const fn default_max_body_bytes() -> usize {
    64 * 1024
}

/// Attestation store configuration, read from JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Socket address the HTTP server binds to.
    pub listen: SocketAddr,
    /// SQLite database path, or `:memory:`.
    pub database: String,
    /// JSON-RPC endpoint used for live target-state reads.
    pub rpc_url: String,
    /// Upper bound on a single target-state read.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Request body limit for POST endpoints.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl StoreConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}
