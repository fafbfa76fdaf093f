/// Agreement data model and id encoding
pub mod agreement;
/// Completion claims, canonical message and signature recovery
pub mod attestation;
pub mod chain;
/// Condition data, evaluator registry and
/// deterministic evaluation logic
pub mod condition;
pub mod error;
/// Escrow ledger state machine
pub mod escrow;
pub mod interface;
pub mod receiver;
pub mod state;
pub mod token;

pub use agreement::{Agreement, AgreementState, NewAgreement};
pub use chain::LocalChain;
pub use condition::{Condition, ConditionImplRegistry, ConditionKind};
use error::LedgerError;
pub use escrow::{CallContext, Execution, FeeConfig, Ledger, LedgerConfig, LedgerEvent, SkipReason};
pub use receiver::Receiver;

pub type Result<T> = std::result::Result<T, LedgerError>;
