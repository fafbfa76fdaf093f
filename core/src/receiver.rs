//! The sole authorized write path into the ledger from off-chain.

use ethers_core::types::Address;
use tracing::{info, warn};

use crate::agreement::{decode_id, encode_id};
use crate::error::ReceiverError;
use crate::escrow::{CallContext, Execution, Ledger};
use crate::state::StateView;
use crate::token::TokenLedger;

/// Size of a report payload: one 32-byte big-endian agreement id.
pub const REPORT_LEN: usize = 32;

/// Packs an agreement id into a report payload.
pub fn encode_report(agreement_id: u64) -> Vec<u8> {
    encode_id(agreement_id).to_vec()
}

/// Unpacks the agreement id from a report payload.
pub fn decode_report(payload: &[u8]) -> Result<u64, ReceiverError> {
    decode_id(payload).ok_or(ReceiverError::MalformedPayload(payload.len()))
}

/// Accepts reports from one fixed sender and forwards them to
/// `Ledger::execute_if_satisfied`.
///
/// Duplicate or late reports are harmless: the ledger skips anything that
/// is no longer `Funded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receiver {
    address: Address,
    authorized_sender: Address,
}

impl Receiver {
    pub fn new(address: Address, authorized_sender: Address) -> Self {
        Self {
            address,
            authorized_sender,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn authorized_sender(&self) -> Address {
        self.authorized_sender
    }

    pub fn on_report<T: TokenLedger>(
        &self,
        sender: Address,
        payload: &[u8],
        ledger: &mut Ledger<T>,
        now: u64,
        state: &dyn StateView,
    ) -> Result<Execution, ReceiverError> {
        if sender != self.authorized_sender {
            warn!(sender = ?sender, "Report from unauthorized sender rejected");
            return Err(ReceiverError::UnauthorizedSender(sender));
        }
        let id = decode_report(payload)?;
        let ctx = CallContext::new(self.address, now);
        let execution = ledger.execute_if_satisfied(ctx, id, state)?;
        info!(id, ?execution, "Report forwarded");
        Ok(execution)
    }
}
