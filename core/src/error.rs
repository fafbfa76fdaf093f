use ethers_core::types::Address;
use thiserror::Error;

use crate::agreement::AgreementState;

/// Escrow ledger errors.
///
/// Every variant aborts the operation that raised it; the ledger is left
/// exactly as it was before the call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("payee must not be the zero address")]
    ZeroPayee,

    #[error("amount must be non-zero")]
    ZeroAmount,

    #[error("deadline {deadline} must be after current time {now}")]
    DeadlineNotInFuture { deadline: u64, now: u64 },

    #[error("condition data must not be empty")]
    EmptyConditionData,

    #[error("no evaluator registered for condition type {0}")]
    UnregisteredCondition(u8),

    #[error("agreement {0} does not exist")]
    UnknownAgreement(u64),

    #[error("caller {0:#x} is not authorized")]
    Unauthorized(Address),

    /// Attempted an invalid state transition.
    #[error("agreement {id} is in state {state:?}")]
    InvalidState { id: u64, state: AgreementState },

    #[error("deadline {deadline} has not passed (now {now})")]
    DeadlineNotPassed { deadline: u64, now: u64 },

    #[error("fee of {0} bps exceeds the maximum")]
    FeeTooHigh(u16),

    #[error("fee recipient must not be the zero address")]
    ZeroFeeRecipient,

    #[error("arithmetic overflow")]
    Overflow,

    #[error("token error: {0}")]
    Token(#[from] TokenError),
}

/// Errors raised by the token interface.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("insufficient balance for {holder:#x}: needed {needed}, available {available}")]
    InsufficientBalance {
        holder: Address,
        needed: u128,
        available: u128,
    },

    #[error("balance overflow")]
    Overflow,
}

/// Errors raised by the authorized write gate.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReceiverError {
    #[error("sender {0:#x} is not the authorized sender")]
    UnauthorizedSender(Address),

    #[error("malformed report payload of {0} bytes")]
    MalformedPayload(usize),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Boundary validation errors for attestation claims.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AttestationError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("`{field}` is not a 20-byte hex address: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("`{field}` is not a 32-byte hex hash: {value}")]
    InvalidHash { field: &'static str, value: String },

    #[error("`{field}` is not a 65-byte hex signature")]
    InvalidSignature { field: &'static str },

    #[error("`{field}` is not a non-negative integer: {value}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("unknown task status `{0}`")]
    UnknownStatus(String),
}
