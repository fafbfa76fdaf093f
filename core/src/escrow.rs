//! Escrow ledger: agreement state machine, fee accounting and condition dispatch.

use std::collections::BTreeMap;

use ethers_core::types::Address;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agreement::{Agreement, AgreementState, NewAgreement};
use crate::condition::{ConditionImplRegistry, ConditionKind, EvalEnv};
use crate::error::LedgerError;
use crate::state::StateView;
use crate::token::TokenLedger;
use crate::Result;

/// Basis-point denominator for fee computation.
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Upper bound accepted by `set_fee_config`.
pub const MAX_FEE_BPS: u16 = 500;

/// Who is calling and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    pub now: u64,
}

impl CallContext {
    pub fn new(caller: Address, now: u64) -> Self {
        Self { caller, now }
    }
}

/// Protocol fee charged on top of the escrowed amount at deposit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeeConfig {
    pub fee_bps: u16,
    pub recipient: Address,
}

impl FeeConfig {
    /// `floor(amount * fee_bps / 10_000)`.
    pub fn fee_for(&self, amount: u128) -> Result<u128> {
        amount
            .checked_mul(u128::from(self.fee_bps))
            .map(|scaled| scaled / BPS_DENOMINATOR)
            .ok_or(LedgerError::Overflow)
    }
}

/// Owner-controlled configuration, passed explicitly into the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerConfig {
    pub owner: Address,
    pub fee: FeeConfig,
    pub conditions: ConditionImplRegistry,
}

/// Why an execution attempt did not release funds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SkipReason {
    NotFunded,
    DeadlinePassed,
    ConditionMissing,
    ConditionNotSatisfied,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFunded => "state!=Funded",
            Self::DeadlinePassed => "deadline passed",
            Self::ConditionMissing => "condition missing",
            Self::ConditionNotSatisfied => "condition not satisfied",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of `execute_if_satisfied`. A skip is a normal outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    Executed {
        id: u64,
        payee: Address,
        amount: u128,
    },
    Skipped(SkipReason),
}

impl Execution {
    pub fn is_executed(&self) -> bool {
        matches!(self, Self::Executed { .. })
    }
}

/// Events emitted by the ledger, in emission order.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    AgreementCreated {
        id: u64,
        payer: Address,
        payee: Address,
        asset: Address,
        amount: u128,
        deadline: u64,
    },
    Deposited {
        id: u64,
        payer: Address,
        amount: u128,
        fee: u128,
    },
    Executing {
        id: u64,
    },
    Completed {
        id: u64,
        payee: Address,
        amount: u128,
    },
    ExecutionSkipped {
        id: u64,
        reason: SkipReason,
    },
    Refunded {
        id: u64,
        payer: Address,
        amount: u128,
    },
    /// Re-examination trigger, fired on creation and on deposit.
    EscrowSignal {
        id: u64,
    },
    ConditionImplSet {
        condition_type: u8,
        kind: Option<ConditionKind>,
    },
    FeeConfigSet {
        fee_bps: u16,
        recipient: Address,
    },
}

/// The escrow ledger.
///
/// Holds escrowed funds under its own `address` in the token book `T`.
#[derive(Debug, Clone)]
pub struct Ledger<T> {
    address: Address,
    config: LedgerConfig,
    agreements: BTreeMap<u64, Agreement>,
    next_id: u64,
    tokens: T,
    events: Vec<LedgerEvent>,
}

impl<T: TokenLedger> Ledger<T> {
    pub fn new(address: Address, config: LedgerConfig, tokens: T) -> Self {
        Self {
            address,
            config,
            agreements: BTreeMap::new(),
            next_id: 1,
            tokens,
            events: Vec::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn agreement(&self, id: u64) -> Option<&Agreement> {
        self.agreements.get(&id)
    }

    pub fn condition_impl(&self, condition_type: u8) -> Option<ConditionKind> {
        self.config.conditions.resolve(condition_type)
    }

    pub fn fee_config(&self) -> FeeConfig {
        self.config.fee
    }

    pub fn owner(&self) -> Address {
        self.config.owner
    }

    /// Id the next created agreement will receive.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn tokens(&self) -> &T {
        &self.tokens
    }

    pub fn tokens_mut(&mut self) -> &mut T {
        &mut self.tokens
    }

    /// Registers (or with `None`, unregisters) the evaluator for a condition type.
    pub fn set_condition_impl(
        &mut self,
        ctx: CallContext,
        condition_type: u8,
        kind: Option<ConditionKind>,
    ) -> Result<()> {
        self.only_owner(ctx)?;
        self.config.conditions.set(condition_type, kind);
        info!(condition_type, ?kind, "Condition impl set");
        self.events.push(LedgerEvent::ConditionImplSet {
            condition_type,
            kind,
        });
        Ok(())
    }

    pub fn set_fee_config(
        &mut self,
        ctx: CallContext,
        fee_bps: u16,
        recipient: Address,
    ) -> Result<()> {
        self.only_owner(ctx)?;
        if fee_bps > MAX_FEE_BPS {
            return Err(LedgerError::FeeTooHigh(fee_bps));
        }
        if recipient.is_zero() {
            return Err(LedgerError::ZeroFeeRecipient);
        }
        self.config.fee = FeeConfig { fee_bps, recipient };
        info!(fee_bps, recipient = ?recipient, "Fee config set");
        self.events.push(LedgerEvent::FeeConfigSet { fee_bps, recipient });
        Ok(())
    }

    /// Creates a new agreement paid by the caller.
    pub fn create_agreement(&mut self, ctx: CallContext, params: NewAgreement) -> Result<u64> {
        if params.payee.is_zero() {
            return Err(LedgerError::ZeroPayee);
        }
        if params.amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        if params.deadline <= ctx.now {
            return Err(LedgerError::DeadlineNotInFuture {
                deadline: params.deadline,
                now: ctx.now,
            });
        }
        if params.condition.data.is_empty() {
            return Err(LedgerError::EmptyConditionData);
        }
        let condition_type = params.condition.condition_type;
        if self.config.conditions.resolve(condition_type).is_none() {
            return Err(LedgerError::UnregisteredCondition(condition_type));
        }

        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or(LedgerError::Overflow)?;

        let agreement = Agreement {
            id,
            payer: ctx.caller,
            payee: params.payee,
            asset: params.asset,
            amount: params.amount,
            created_at: ctx.now,
            deadline: params.deadline,
            condition: params.condition,
            state: AgreementState::Created,
        };
        info!(
            id,
            payer = ?agreement.payer,
            payee = ?agreement.payee,
            amount = agreement.amount,
            "Agreement created"
        );

        self.events.push(LedgerEvent::AgreementCreated {
            id,
            payer: agreement.payer,
            payee: agreement.payee,
            asset: agreement.asset,
            amount: agreement.amount,
            deadline: agreement.deadline,
        });
        self.events.push(LedgerEvent::EscrowSignal { id });
        self.agreements.insert(id, agreement);
        Ok(id)
    }

    /// Collects `amount + fee` from the payer and routes the fee to the
    /// fee recipient.
    pub fn deposit(&mut self, ctx: CallContext, id: u64) -> Result<()> {
        let agreement = self.get(id)?;
        if ctx.caller != agreement.payer {
            return Err(LedgerError::Unauthorized(ctx.caller));
        }
        if agreement.state != AgreementState::Created {
            return Err(LedgerError::InvalidState {
                id,
                state: agreement.state,
            });
        }
        let (payer, asset, amount) = (agreement.payer, agreement.asset, agreement.amount);

        let fee_config = self.config.fee;
        let fee = fee_config.fee_for(amount)?;
        let total = amount.checked_add(fee).ok_or(LedgerError::Overflow)?;

        self.tokens.transfer(asset, payer, self.address, total)?;
        if fee > 0 {
            if let Err(e) = self
                .tokens
                .transfer(asset, self.address, fee_config.recipient, fee)
            {
                // undo the collection
                self.tokens.transfer(asset, self.address, payer, total)?;
                return Err(e.into());
            }
        }

        self.set_state(id, AgreementState::Funded);
        info!(id, amount, fee, "Agreement funded");
        self.events.push(LedgerEvent::Deposited {
            id,
            payer,
            amount,
            fee,
        });
        self.events.push(LedgerEvent::EscrowSignal { id });
        Ok(())
    }

    /// Releases funds to the payee if, and only if, the agreement is funded,
    /// before its deadline, and its condition holds right now.
    ///
    /// Never fails on an unmet precondition: those resolve to
    /// `Execution::Skipped` so anyone can call this repeatedly at no risk.
    /// Only a failing token transfer is an error, and it leaves the
    /// agreement `Funded`.
    pub fn execute_if_satisfied(
        &mut self,
        ctx: CallContext,
        id: u64,
        state: &dyn StateView,
    ) -> Result<Execution> {
        let Some(agreement) = self.agreements.get(&id) else {
            return Ok(self.skip(id, SkipReason::NotFunded));
        };
        if agreement.state != AgreementState::Funded {
            return Ok(self.skip(id, SkipReason::NotFunded));
        }
        if ctx.now > agreement.deadline {
            return Ok(self.skip(id, SkipReason::DeadlinePassed));
        }
        let condition = &agreement.condition;
        let Some(kind) = self.config.conditions.resolve(condition.condition_type) else {
            return Ok(self.skip(id, SkipReason::ConditionMissing));
        };
        let env = EvalEnv {
            now: ctx.now,
            state,
        };
        if !kind
            .evaluator()
            .is_satisfied(condition.target, &condition.data, &env)
        {
            return Ok(self.skip(id, SkipReason::ConditionNotSatisfied));
        }

        let (payee, asset, amount) = (agreement.payee, agreement.asset, agreement.amount);

        self.set_state(id, AgreementState::Executing);
        self.events.push(LedgerEvent::Executing { id });

        if let Err(e) = self.tokens.transfer(asset, self.address, payee, amount) {
            self.set_state(id, AgreementState::Funded);
            self.events.pop();
            return Err(e.into());
        }

        self.set_state(id, AgreementState::Completed);
        info!(id, payee = ?payee, amount, "Agreement completed");
        self.events.push(LedgerEvent::Completed { id, payee, amount });
        Ok(Execution::Executed { id, payee, amount })
    }

    /// Returns the escrowed amount to the payer once the deadline has passed.
    /// The fee is not refunded.
    pub fn refund(&mut self, ctx: CallContext, id: u64) -> Result<()> {
        let agreement = self.get(id)?;
        if agreement.state != AgreementState::Funded {
            return Err(LedgerError::InvalidState {
                id,
                state: agreement.state,
            });
        }
        if ctx.now <= agreement.deadline {
            return Err(LedgerError::DeadlineNotPassed {
                deadline: agreement.deadline,
                now: ctx.now,
            });
        }
        let (payer, asset, amount) = (agreement.payer, agreement.asset, agreement.amount);

        self.tokens.transfer(asset, self.address, payer, amount)?;
        self.set_state(id, AgreementState::Refunded);
        info!(id, payer = ?payer, amount, "Agreement refunded");
        self.events.push(LedgerEvent::Refunded { id, payer, amount });
        Ok(())
    }

    fn get(&self, id: u64) -> Result<&Agreement> {
        self.agreements
            .get(&id)
            .ok_or(LedgerError::UnknownAgreement(id))
    }

    fn set_state(&mut self, id: u64, state: AgreementState) {
        if let Some(agreement) = self.agreements.get_mut(&id) {
            agreement.state = state;
        }
    }

    fn skip(&mut self, id: u64, reason: SkipReason) -> Execution {
        debug!(id, %reason, "Execution skipped");
        self.events.push(LedgerEvent::ExecutionSkipped { id, reason });
        Execution::Skipped(reason)
    }

    fn only_owner(&self, ctx: CallContext) -> Result<()> {
        if ctx.caller != self.config.owner {
            return Err(LedgerError::Unauthorized(ctx.caller));
        }
        Ok(())
    }
}
