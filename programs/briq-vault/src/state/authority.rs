//! # Component Authority
//!
//! Owner and operator bookkeeping shared by every engine component.
//!
//! ## Security Model:
//! ```text
//! Admin call: "set price feed"
//!       ↓
//! Component: "Who's asking?"
//!       ↓
//! caller == owner → Allow
//! otherwise       → NotOwner
//! ```

use std::collections::BTreeSet;
use std::sync::RwLock;

use crate::errors::{Result, VaultError};

use super::Address;

/// Owner plus an optional set of operators.
///
/// Operators are trusted for recovery paths only; they cannot change
/// configuration.
#[derive(Debug)]
pub struct Authority {
    owner: RwLock<Address>,
    operators: RwLock<BTreeSet<Address>>,
}

impl Authority {
    pub fn new(owner: Address) -> Self {
        Self {
            owner: RwLock::new(owner),
            operators: RwLock::new(BTreeSet::new()),
        }
    }

    pub fn owner(&self) -> Address {
        *self.owner.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn ensure_owner(&self, caller: &Address) -> Result<()> {
        if *caller != self.owner() {
            return Err(VaultError::NotOwner { caller: *caller });
        }
        Ok(())
    }

    pub fn is_operator(&self, caller: &Address) -> bool {
        *caller == self.owner()
            || self
                .operators
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .contains(caller)
    }

    /// Grant or revoke the operator role. Granting twice is a no-op.
    pub fn set_operator(&self, caller: &Address, operator: Address, enabled: bool) -> Result<()> {
        self.ensure_owner(caller)?;
        operator.ensure_non_zero("operator")?;

        let mut operators = self.operators.write().unwrap_or_else(|e| e.into_inner());
        if enabled {
            operators.insert(operator);
        } else {
            operators.remove(&operator);
        }
        Ok(())
    }

    pub fn transfer_ownership(&self, caller: &Address, new_owner: Address) -> Result<()> {
        self.ensure_owner(caller)?;
        new_owner.ensure_non_zero("new owner")?;
        *self.owner.write().unwrap_or_else(|e| e.into_inner()) = new_owner;
        Ok(())
    }
}
