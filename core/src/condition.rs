//! Escrow conditions, the evaluator registry, and deterministic evaluation.

use std::collections::BTreeMap;

use ethers_core::types::{Address, U256};
use hex::serde as hex_serde;
use serde::{Deserialize, Serialize};

use crate::state::StateView;

pub mod state_equals;
pub mod time_lock;

pub use state_equals::StateEquals;
pub use time_lock::TimeLock;

/// Release condition attached to an agreement.
///
/// `data` is opaque to the ledger and interpreted only by the evaluator
/// registered for `condition_type` at the time of the check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Condition {
    pub condition_type: u8,
    pub target: Option<Address>,
    #[serde(with = "hex_serde")]
    pub data: Vec<u8>,
}

impl Condition {
    /// Condition satisfied once `now >= unlock_at`.
    pub fn time_lock(condition_type: u8, unlock_at: u64) -> Self {
        Self {
            condition_type,
            target: None,
            data: word(U256::from(unlock_at)).to_vec(),
        }
    }

    /// Condition satisfied once `target`'s state at `key` equals `value`.
    pub fn state_equals(condition_type: u8, target: Address, key: U256, value: U256) -> Self {
        let mut data = Vec::with_capacity(64);
        data.extend_from_slice(&word(key));
        data.extend_from_slice(&word(value));
        Self {
            condition_type,
            target: Some(target),
            data,
        }
    }
}

/// Closed set of evaluator implementations a condition type can map to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    TimeLock,
    StateEquals,
}

impl ConditionKind {
    pub fn evaluator(self) -> &'static dyn Evaluator {
        match self {
            Self::TimeLock => &TimeLock,
            Self::StateEquals => &StateEquals,
        }
    }
}

/// Chain snapshot an evaluator reads from.
pub struct EvalEnv<'a> {
    pub now: u64,
    pub state: &'a dyn StateView,
}

/// Satisfaction predicate for one condition kind.
///
/// Must be a pure, deterministic read of `env`. Malformed `data` is never an
/// error, only "not satisfied".
pub trait Evaluator: Sync {
    fn is_satisfied(&self, target: Option<Address>, data: &[u8], env: &EvalEnv<'_>) -> bool;
}

/// Owner-mutated mapping from condition type to evaluator.
///
/// Not versioned: remapping a type changes the outcome for every existing
/// agreement that references it, because the mapping is resolved again on
/// every check.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConditionImplRegistry {
    entries: BTreeMap<u8, ConditionKind>,
}

impl ConditionImplRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `kind` for `condition_type`, or unregisters it with `None`.
    pub fn set(&mut self, condition_type: u8, kind: Option<ConditionKind>) {
        match kind {
            Some(kind) => {
                self.entries.insert(condition_type, kind);
            }
            None => {
                self.entries.remove(&condition_type);
            }
        }
    }

    pub fn resolve(&self, condition_type: u8) -> Option<ConditionKind> {
        self.entries.get(&condition_type).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, ConditionKind)> + '_ {
        self.entries.iter().map(|(ty, kind)| (*ty, *kind))
    }
}

fn word(value: U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    value.to_big_endian(&mut out);
    out
}

/// Reads the `index`-th 32-byte big-endian word of `data`.
pub(crate) fn read_word(data: &[u8], index: usize) -> Option<U256> {
    let start = index.checked_mul(32)?;
    data.get(start..start + 32).map(U256::from_big_endian)
}
