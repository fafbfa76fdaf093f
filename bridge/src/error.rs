use vescrow_core::error::ReceiverError;

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Failures that escape the bridge.
///
/// Only configuration and report submission can fail; everything between
/// the signal and the write resolves to a skip instead.
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Blockchain error: {0}")]
    Blockchain(String),
    #[error("Report transaction dropped from mempool")]
    TxDropped,
    #[error("Report transaction {0:#x} reverted")]
    Reverted(ethers::types::H256),
    #[error("Receiver rejected report: {0}")]
    Rejected(#[from] ReceiverError),
}

impl From<ethers::providers::ProviderError> for BridgeError {
    fn from(value: ethers::providers::ProviderError) -> Self {
        Self::Blockchain(value.to_string())
    }
}

impl From<ethers::signers::WalletError> for BridgeError {
    fn from(value: ethers::signers::WalletError) -> Self {
        Self::Config(value.to_string())
    }
}
