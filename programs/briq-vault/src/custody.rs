//! # Token Custody
//!
//! The token ledger the engine moves funds through. In production this is
//! the chain's token contracts; [`crate::sim::InMemoryCustody`] stands in
//! for tests and the development backend.
//!
//! ## Fund Flow
//!
//! ```text
//! deposit:   user ──▶ vault ──▶ coordinator ──▶ adapter ──▶ market
//! withdraw:  user ◀── vault ◀── coordinator ◀── adapter ◀── market
//! ```

use crate::errors::Result;
use crate::state::Address;

pub trait TokenCustody: Send + Sync {
    /// Move `amount` of `asset` from `from` to `to`.
    ///
    /// Fails with `InsufficientTokenBalance` without moving anything if
    /// `from` holds less than `amount`.
    fn transfer(&self, asset: &Address, from: &Address, to: &Address, amount: u128) -> Result<()>;

    fn balance_of(&self, asset: &Address, holder: &Address) -> u128;
}
