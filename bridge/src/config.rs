use std::time::Duration;

use ethers::types::Address;
use serde::{Deserialize, Serialize};

const fn default_request_timeout_ms() -> u64 {
    5_000
}

const fn default_poll_interval_ms() -> u64 {
    2_000
}

/// Settlement bridge configuration, read from JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    /// JSON-RPC endpoint of the host chain.
    pub rpc_url: String,
    /// Chain id attestations are looked up under.
    pub chain_id: u64,
    /// Ledger contract emitting `EscrowSignal`.
    pub ledger_address: Address,
    /// Receiver contract accepting reports.
    pub receiver_address: Address,
    /// Base URL of the attestation store.
    pub store_url: String,
    /// Hex key of the receiver's authorized sender.
    pub sender_private_key: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// First block to scan for signals; the chain head when unset.
    #[serde(default)]
    pub from_block: Option<u64>,
}

impl BridgeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
