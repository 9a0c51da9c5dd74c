use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use crate::custody::TokenCustody;
use crate::errors::{Result, VaultError};
use crate::state::Address;

/// Token balances keyed by (asset, holder).
#[derive(Debug, Default)]
pub struct InMemoryCustody {
    balances: RwLock<HashMap<(Address, Address), u128>>,
}

impl InMemoryCustody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `amount` of `asset` out of thin air for `to`.
    pub fn mint(&self, asset: &Address, to: &Address, amount: u128) -> Result<()> {
        let mut balances = self.balances.write().unwrap_or_else(|e| e.into_inner());
        let balance = balances.entry((*asset, *to)).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(VaultError::Overflow)?;
        Ok(())
    }

    /// Sum of every holder's balance of `asset`.
    pub fn total_supply(&self, asset: &Address) -> u128 {
        self.balances
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|((a, _), _)| a == asset)
            .fold(0u128, |acc, (_, v)| acc.saturating_add(*v))
    }
}

impl TokenCustody for InMemoryCustody {
    fn transfer(&self, asset: &Address, from: &Address, to: &Address, amount: u128) -> Result<()> {
        if amount == 0 || from == to {
            return Ok(());
        }

        let mut balances = self.balances.write().unwrap_or_else(|e| e.into_inner());
        let available = balances.get(&(*asset, *from)).copied().unwrap_or(0);
        if available < amount {
            return Err(VaultError::InsufficientTokenBalance {
                asset: *asset,
                holder: *from,
                required: amount,
                available,
            });
        }

        let receiver = balances.get(&(*asset, *to)).copied().unwrap_or(0);
        let receiver = receiver.checked_add(amount).ok_or(VaultError::Overflow)?;

        balances.insert((*asset, *from), available - amount);
        balances.insert((*asset, *to), receiver);
        debug!("transfer {} of {} from {} to {}", amount, asset, from, to);
        Ok(())
    }

    fn balance_of(&self, asset: &Address, holder: &Address) -> u128 {
        self.balances
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(*asset, *holder))
            .copied()
            .unwrap_or(0)
    }
}
