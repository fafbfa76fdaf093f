//! Minimal fungible-token interface the ledger moves value through.

use std::collections::HashMap;

use ethers_core::types::Address;

use crate::error::TokenError;

/// Balance accounting for fungible assets.
pub trait TokenLedger {
    fn balance_of(&self, asset: Address, holder: Address) -> u128;

    /// Moves `amount` of `asset` from `from` to `to`.
    ///
    /// On error no balance changes.
    fn transfer(
        &mut self,
        asset: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<(), TokenError>;
}

/// In-memory balance book.
#[derive(Debug, Clone, Default)]
pub struct Balances {
    balances: HashMap<(Address, Address), u128>,
}

impl Balances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits `amount` of `asset` to `holder` out of thin air.
    pub fn mint(
        &mut self,
        asset: Address,
        holder: Address,
        amount: u128,
    ) -> Result<(), TokenError> {
        let balance = self.balances.entry((asset, holder)).or_default();
        *balance = balance.checked_add(amount).ok_or(TokenError::Overflow)?;
        Ok(())
    }
}

impl TokenLedger for Balances {
    fn balance_of(&self, asset: Address, holder: Address) -> u128 {
        self.balances
            .get(&(asset, holder))
            .copied()
            .unwrap_or_default()
    }

    fn transfer(
        &mut self,
        asset: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<(), TokenError> {
        let available = self.balance_of(asset, from);
        if available < amount {
            return Err(TokenError::InsufficientBalance {
                holder: from,
                needed: amount,
                available,
            });
        }
        if from == to {
            return Ok(());
        }
        let credited = self
            .balance_of(asset, to)
            .checked_add(amount)
            .ok_or(TokenError::Overflow)?;

        self.balances.insert((asset, from), available - amount);
        self.balances.insert((asset, to), credited);
        Ok(())
    }
}
