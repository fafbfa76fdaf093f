//! Agreement data model and id encoding.

use ethers_core::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::condition::Condition;

/// Lifecycle of an agreement.
///
/// `Executing` only exists inside a single execution attempt and is never
/// observed as a stable outcome.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgreementState {
    /// Created by the payer; no funds locked yet.
    Created,
    /// Funds (amount plus fee) have been collected from the payer.
    Funded,
    /// Reentrancy guard held while the payout is in flight.
    Executing,
    /// Condition met; funds released to the payee.
    Completed,
    /// Deadline passed while funded; funds returned to the payer.
    Refunded,
}

impl AgreementState {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Refunded)
    }
}

/// One escrow instance between a payer and a payee.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Agreement {
    pub id: u64,
    pub payer: Address,
    pub payee: Address,
    /// Fungible token the amount is denominated in.
    pub asset: Address,
    /// Amount in the asset's smallest unit.
    pub amount: u128,
    pub created_at: u64,
    pub deadline: u64,
    pub condition: Condition,
    pub state: AgreementState,
}

/// Parameters for `Ledger::create_agreement`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewAgreement {
    pub payee: Address,
    pub asset: Address,
    pub amount: u128,
    pub deadline: u64,
    pub condition: Condition,
}

/// Encodes an agreement id as a 32-byte big-endian word, the layout used
/// both by indexed event topics and by report payloads.
pub fn encode_id(id: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    U256::from(id).to_big_endian(&mut word);
    word
}

/// Decodes a 32-byte big-endian word into an agreement id.
///
/// Returns `None` when the slice is not exactly one word or the value does
/// not fit an id.
pub fn decode_id(word: &[u8]) -> Option<u64> {
    if word.len() != 32 {
        return None;
    }
    let value = U256::from_big_endian(word);
    (value <= U256::from(u64::MAX)).then(|| value.as_u64())
}
