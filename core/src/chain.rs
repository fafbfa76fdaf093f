//! In-process host chain: one ledger, its receiver, external target state
//! and a clock, serialized behind `&mut self`.

use ethers_core::types::{Address, U256};

use crate::agreement::NewAgreement;
use crate::error::ReceiverError;
use crate::escrow::{CallContext, Execution, Ledger, LedgerEvent};
use crate::receiver::Receiver;
use crate::state::{StateBook, StateView};
use crate::token::Balances;
use crate::Result;

#[derive(Debug, Clone)]
pub struct LocalChain {
    chain_id: u64,
    now: u64,
    ledger: Ledger<Balances>,
    receiver: Receiver,
    state: StateBook,
}

impl LocalChain {
    pub fn new(chain_id: u64, now: u64, ledger: Ledger<Balances>, receiver: Receiver) -> Self {
        Self {
            chain_id,
            now,
            ledger,
            receiver,
            state: StateBook::new(),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    /// Moves the clock forward by `secs`.
    pub fn advance(&mut self, secs: u64) {
        self.now = self.now.saturating_add(secs);
    }

    pub fn ledger(&self) -> &Ledger<Balances> {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut Ledger<Balances> {
        &mut self.ledger
    }

    pub fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    pub fn state(&self) -> &StateBook {
        &self.state
    }

    /// Records the outcome of an external action on `target`.
    pub fn set_state(&mut self, target: Address, key: U256, value: U256) {
        self.state.set(target, key, value);
    }

    pub fn ctx(&self, caller: Address) -> CallContext {
        CallContext::new(caller, self.now)
    }

    pub fn create_agreement(&mut self, payer: Address, params: NewAgreement) -> Result<u64> {
        let ctx = self.ctx(payer);
        self.ledger.create_agreement(ctx, params)
    }

    pub fn deposit(&mut self, payer: Address, id: u64) -> Result<()> {
        let ctx = self.ctx(payer);
        self.ledger.deposit(ctx, id)
    }

    pub fn refund(&mut self, caller: Address, id: u64) -> Result<()> {
        let ctx = self.ctx(caller);
        self.ledger.refund(ctx, id)
    }

    pub fn execute_if_satisfied(&mut self, caller: Address, id: u64) -> Result<Execution> {
        let ctx = self.ctx(caller);
        self.ledger.execute_if_satisfied(ctx, id, &self.state)
    }

    /// Delivers a report through the receiver.
    pub fn submit_report(
        &mut self,
        sender: Address,
        payload: &[u8],
    ) -> std::result::Result<Execution, ReceiverError> {
        self.receiver
            .on_report(sender, payload, &mut self.ledger, self.now, &self.state)
    }

    /// Agreement ids of every `EscrowSignal` emitted so far, in order.
    pub fn signals(&self) -> Vec<u64> {
        self.ledger
            .events()
            .iter()
            .filter_map(|event| match event {
                LedgerEvent::EscrowSignal { id } => Some(*id),
                _ => None,
            })
            .collect()
    }
}

impl StateView for LocalChain {
    fn value_at(&self, target: Address, key: U256) -> Option<U256> {
        self.state.value_at(target, key)
    }
}
