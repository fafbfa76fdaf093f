//! Live reads of external target state.

use std::sync::Arc;

use ethers::abi::{parse_abi, Abi};
use ethers::contract::Contract;
use ethers::providers::{Http, Provider};
use ethers::types::{Address, U256};
use parking_lot::Mutex;
use tracing::{instrument, trace};
use vescrow_core::state::StateView;

use crate::error::{Result, StoreError};

/// View function every attestable target exposes.
pub const STATE_GETTER_SIG: &str = "function valueOf(uint256 key) view returns (uint256)";
const STATE_GETTER: &str = "valueOf";

/// Source of truth for an external target's state at a key.
#[async_trait::async_trait]
pub trait ExternalStateReader: Send + Sync {
    async fn read(&self, target: Address, key: U256) -> Result<U256>;
}

/// Reads target state through an Ethereum JSON-RPC endpoint.
pub struct EthStateReader {
    provider: Arc<Provider<Http>>,
    abi: Abi,
}

impl EthStateReader {
    pub fn new(rpc_url: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| StoreError::ChainRead(e.to_string()))?;
        let abi =
            parse_abi(&[STATE_GETTER_SIG]).map_err(|e| StoreError::ChainRead(e.to_string()))?;
        Ok(Self {
            provider: Arc::new(provider),
            abi,
        })
    }
}

#[async_trait::async_trait]
impl ExternalStateReader for EthStateReader {
    #[instrument(skip(self))]
    async fn read(&self, target: Address, key: U256) -> Result<U256> {
        let contract = Contract::new(target, self.abi.clone(), self.provider.clone());
        let value = contract
            .method::<_, U256>(STATE_GETTER, key)
            .map_err(|e| StoreError::ChainRead(e.to_string()))?
            .call()
            .await
            .map_err(|e| StoreError::ChainRead(e.to_string()))?;
        trace!(%value, "Target state read");
        Ok(value)
    }
}

/// Reads from a shared in-process state view, e.g. a `LocalChain`.
pub struct SharedStateReader<V> {
    view: Arc<Mutex<V>>,
}

impl<V> SharedStateReader<V> {
    pub fn new(view: Arc<Mutex<V>>) -> Self {
        Self { view }
    }
}

#[async_trait::async_trait]
impl<V: StateView + Send + 'static> ExternalStateReader for SharedStateReader<V> {
    async fn read(&self, target: Address, key: U256) -> Result<U256> {
        self.view
            .lock()
            .value_at(target, key)
            .ok_or_else(|| StoreError::ChainRead(format!("no state for {target:#x}")))
    }
}
