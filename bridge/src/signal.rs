//! `EscrowSignal` log decoding and filtering.

use ethers::contract::EthEvent;
use ethers::types::{Address, Filter, Log, U256};
use vescrow_core::agreement::decode_id;

/// ABI for the `EscrowSignal` event, emitted on creation and deposit.
#[derive(Clone, Debug, EthEvent)]
#[ethevent(name = "EscrowSignal", abi = "EscrowSignal(uint256 indexed id)")]
pub struct EscrowSignalEvent {
    pub id: U256,
}

/// Log filter matching every `EscrowSignal` of `ledger`.
pub fn signal_filter(ledger: Address) -> Filter {
    Filter::new()
        .address(ledger)
        .topic0(EscrowSignalEvent::signature())
}

/// Agreement id carried in the indexed topic of an `EscrowSignal` log.
///
/// `None` for any other log or an id that does not fit a `u64`.
pub fn agreement_id(log: &Log) -> Option<u64> {
    if log.topics.first() != Some(&EscrowSignalEvent::signature()) {
        return None;
    }
    decode_id(log.topics.get(1)?.as_bytes())
}
