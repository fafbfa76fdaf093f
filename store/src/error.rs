use vescrow_core::error::AttestationError;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("invalid claim: {0}")]
    Validation(#[from] AttestationError),
    #[error("value {0} does not fit storage")]
    OutOfRange(u64),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("chain read failed: {0}")]
    ChainRead(String),
    #[error("database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl StoreError {
    /// Whether the error was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::OutOfRange(_))
    }
}
