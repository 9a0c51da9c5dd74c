//! # Share Ledger (BRIQ)
//!
//! Fungible ledger of vault ownership shares. 18 decimals, one share is
//! worth one dollar when the first deposit lands.
//!
//! ## Authority
//!
//! ```text
//! owner ── set_vault(vault) ──▶ vault address recorded once
//! vault ── mint / burn ───────▶ balances, total_supply
//! holder ─ transfer ──────────▶ balances
//! ```
//!
//! `total_supply` always equals the sum of all balances. Holders whose
//! balance returns to zero are removed from the map.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::clock::Clock;
use crate::errors::{Result, VaultError};
use crate::events::{EventLog, ShareVaultSet, SharesBurned, SharesMinted};
use crate::state::{Address, Authority};

#[derive(Debug, Default)]
struct Ledger {
    balances: HashMap<Address, u128>,
    total_supply: u128,
}

/// # BriqShares
pub struct BriqShares {
    authority: Authority,
    vault: RwLock<Option<Address>>,
    ledger: RwLock<Ledger>,
    clock: Arc<dyn Clock>,
    events: Arc<EventLog>,
}

impl BriqShares {
    pub const NAME: &'static str = "Briq Shares";
    pub const SYMBOL: &'static str = "BRIQ";
    pub const DECIMALS: u8 = 18;

    pub fn new(owner: Address, clock: Arc<dyn Clock>, events: Arc<EventLog>) -> Self {
        Self {
            authority: Authority::new(owner),
            vault: RwLock::new(None),
            ledger: RwLock::new(Ledger::default()),
            clock,
            events,
        }
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn vault(&self) -> Option<Address> {
        *self.vault.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Record the vault allowed to mint and burn.
    ///
    /// Setting the same vault again is a no-op. Setting a different one
    /// after the first call fails with `VaultAlreadySet`.
    pub fn set_vault(&self, caller: &Address, vault: Address) -> Result<()> {
        self.authority.ensure_owner(caller)?;
        vault.ensure_non_zero("vault")?;

        let mut current = self.vault.write().unwrap_or_else(|e| e.into_inner());
        match *current {
            Some(existing) if existing == vault => return Ok(()),
            Some(existing) => return Err(VaultError::VaultAlreadySet { current: existing }),
            None => *current = Some(vault),
        }
        drop(current);

        self.events.emit(ShareVaultSet {
            vault,
            timestamp: self.clock.now(),
        });
        info!("Share ledger bound to vault {}", vault);
        Ok(())
    }

    fn ensure_vault(&self, caller: &Address) -> Result<()> {
        match self.vault() {
            Some(vault) if vault == *caller => Ok(()),
            _ => Err(VaultError::OnlyVault { caller: *caller }),
        }
    }

    pub fn mint(&self, caller: &Address, to: &Address, amount: u128) -> Result<()> {
        self.ensure_vault(caller)?;
        to.ensure_non_zero("mint recipient")?;
        if amount == 0 {
            return Err(VaultError::InvalidShares {
                requested: 0,
                available: 0,
            });
        }

        let total_supply = {
            let mut ledger = self.ledger.write().unwrap_or_else(|e| e.into_inner());
            let new_supply = ledger
                .total_supply
                .checked_add(amount)
                .ok_or(VaultError::Overflow)?;
            let balance = ledger.balances.entry(*to).or_insert(0);
            *balance = balance.checked_add(amount).ok_or(VaultError::Overflow)?;
            ledger.total_supply = new_supply;
            new_supply
        };

        self.events.emit(SharesMinted {
            to: *to,
            amount,
            total_supply,
            timestamp: self.clock.now(),
        });
        Ok(())
    }

    /// Burn `amount` from `from`. Fails with `InvalidShares` rather than
    /// going negative, even though the vault checks first.
    pub fn burn(&self, caller: &Address, from: &Address, amount: u128) -> Result<()> {
        self.ensure_vault(caller)?;

        let total_supply = {
            let mut ledger = self.ledger.write().unwrap_or_else(|e| e.into_inner());
            let available = ledger.balances.get(from).copied().unwrap_or(0);
            if amount == 0 || amount > available {
                return Err(VaultError::InvalidShares {
                    requested: amount,
                    available,
                });
            }

            let remaining = available - amount;
            if remaining == 0 {
                ledger.balances.remove(from);
            } else {
                ledger.balances.insert(*from, remaining);
            }
            ledger.total_supply -= amount;
            ledger.total_supply
        };

        self.events.emit(SharesBurned {
            from: *from,
            amount,
            total_supply,
            timestamp: self.clock.now(),
        });
        Ok(())
    }

    /// Holder-to-holder transfer. `caller` must be the sender.
    pub fn transfer(&self, caller: &Address, to: &Address, amount: u128) -> Result<()> {
        to.ensure_non_zero("transfer recipient")?;
        let mut ledger = self.ledger.write().unwrap_or_else(|e| e.into_inner());

        let available = ledger.balances.get(caller).copied().unwrap_or(0);
        if amount == 0 || amount > available {
            return Err(VaultError::InvalidShares {
                requested: amount,
                available,
            });
        }
        if caller == to {
            return Ok(());
        }

        let receiver = ledger.balances.get(to).copied().unwrap_or(0);
        let receiver = receiver.checked_add(amount).ok_or(VaultError::Overflow)?;

        let remaining = available - amount;
        if remaining == 0 {
            ledger.balances.remove(caller);
        } else {
            ledger.balances.insert(*caller, remaining);
        }
        ledger.balances.insert(*to, receiver);
        Ok(())
    }

    pub fn balance_of(&self, holder: &Address) -> u128 {
        self.ledger
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .balances
            .get(holder)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_supply(&self) -> u128 {
        self.ledger
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .total_supply
    }

    /// Snapshot of all non-zero balances.
    pub fn holders(&self) -> Vec<(Address, u128)> {
        let ledger = self.ledger.read().unwrap_or_else(|e| e.into_inner());
        let mut holders: Vec<_> = ledger.balances.iter().map(|(a, b)| (*a, *b)).collect();
        holders.sort();
        holders
    }
}
