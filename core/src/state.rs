//! Read access to the state of external target systems.

use std::collections::HashMap;

use ethers_core::types::{Address, U256};

/// Live view of external target state, keyed by `(target, key)`.
///
/// Implementations are pure reads. `None` means the state could not be
/// read at all, which every caller treats as "not satisfied".
pub trait StateView {
    fn value_at(&self, target: Address, key: U256) -> Option<U256>;
}

/// In-memory target state with mapping semantics: unset keys read as zero.
#[derive(Debug, Clone, Default)]
pub struct StateBook {
    values: HashMap<(Address, U256), U256>,
}

impl StateBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, target: Address, key: U256, value: U256) {
        self.values.insert((target, key), value);
    }

    pub fn get(&self, target: Address, key: U256) -> U256 {
        self.values
            .get(&(target, key))
            .copied()
            .unwrap_or_default()
    }
}

impl StateView for StateBook {
    fn value_at(&self, target: Address, key: U256) -> Option<U256> {
        Some(self.get(target, key))
    }
}
