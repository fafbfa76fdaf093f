//! Authorized write path to the Receiver.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ethers::abi::parse_abi;
use ethers::contract::Contract;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, H256, U64};
use ethers::utils::keccak256;
use parking_lot::Mutex;
use tracing::{debug, info, instrument};
use vescrow_core::LocalChain;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};

/// Receiver entry point; the argument is an opaque report payload.
pub const ON_REPORT_SIG: &str = "function onReport(bytes report)";
const ON_REPORT: &str = "onReport";

/// Submits a report payload to the Receiver as its authorized sender and
/// returns the transaction hash.
#[async_trait::async_trait]
pub trait ReportWriter: Send + Sync {
    async fn submit(&self, payload: Vec<u8>) -> Result<H256>;
}

/// Sends `onReport(bytes)` transactions to a deployed Receiver.
pub struct EthReportWriter {
    receiver: Contract<SignerMiddleware<Provider<Http>, LocalWallet>>,
}

impl EthReportWriter {
    pub async fn new(config: &BridgeConfig) -> Result<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| BridgeError::Config(e.to_string()))?;
        let chain_id = provider.get_chainid().await?.as_u64();
        if chain_id != config.chain_id {
            return Err(BridgeError::Config(format!(
                "rpc reports chain {chain_id}, configured for {}",
                config.chain_id
            )));
        }
        debug!(%chain_id, "Connected to host chain");

        let sender = config
            .sender_private_key
            .trim_start_matches("0x")
            .parse::<LocalWallet>()?
            .with_chain_id(chain_id);
        info!(sender = ?sender.address(), "Report sender configured");

        let abi = parse_abi(&[ON_REPORT_SIG]).map_err(|e| BridgeError::Config(e.to_string()))?;
        let client = Arc::new(SignerMiddleware::new(provider, sender));
        let receiver = Contract::new(config.receiver_address, abi, client);
        Ok(Self { receiver })
    }
}

#[async_trait::async_trait]
impl ReportWriter for EthReportWriter {
    #[instrument(skip_all, fields(receiver = ?self.receiver.address()))]
    async fn submit(&self, payload: Vec<u8>) -> Result<H256> {
        debug!(payload = %hex::encode(&payload), "Sending onReport transaction");
        let call = self
            .receiver
            .method::<_, ()>(ON_REPORT, Bytes::from(payload))
            .map_err(|e| BridgeError::Blockchain(e.to_string()))?;
        let pending_tx = call
            .send()
            .await
            .map_err(|e| BridgeError::Blockchain(e.to_string()))?;
        let tx_hash = *pending_tx;
        let receipt = pending_tx.await?.ok_or(BridgeError::TxDropped)?;
        if receipt.status == Some(U64::zero()) {
            return Err(BridgeError::Reverted(tx_hash));
        }
        info!(?tx_hash, "onReport transaction mined");
        Ok(tx_hash)
    }
}

/// Delivers reports to an in-process [`LocalChain`].
pub struct LocalReportWriter {
    chain: Arc<Mutex<LocalChain>>,
    sender: Address,
    nonce: AtomicU64,
}

impl LocalReportWriter {
    pub fn new(chain: Arc<Mutex<LocalChain>>, sender: Address) -> Self {
        Self {
            chain,
            sender,
            nonce: AtomicU64::new(0),
        }
    }
}

#[async_trait::async_trait]
impl ReportWriter for LocalReportWriter {
    async fn submit(&self, payload: Vec<u8>) -> Result<H256> {
        let execution = self.chain.lock().submit_report(self.sender, &payload)?;
        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
        let tx_hash = H256::from(keccak256([&nonce.to_be_bytes()[..], &payload].concat()));
        info!(?tx_hash, ?execution, "Report delivered");
        Ok(tx_hash)
    }
}
