//! # Lending Market Interface
//!
//! The minimal surface an external lending protocol exposes to a strategy
//! adapter. Adapters are the only callers.
//!
//! | Operation | Aave-style pool | Compound-style market |
//! |-----------|-----------------|-----------------------|
//! | `supply` | `supply(asset, amount)` | `supply(base, amount)` |
//! | `redeem` | `withdraw(asset, amount)` | `withdraw(base, amount)` |
//! | `balance_of` | aToken balance | `balanceOf(account)` |
//! | `supply_rate_bps` | liquidity rate | supply rate per second, annualized |
//! | `base_asset` | none (multi-asset) | the single base token |

use thiserror::Error;

use crate::state::Address;

/// Failure reported by a lending market.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketFault {
    #[error("market is paused")]
    Paused,

    #[error("market is unreachable")]
    Unreachable,

    #[error("market does not list {0}")]
    UnknownAsset(Address),

    #[error("insufficient market cash: requested {requested}, available {available}")]
    InsufficientCash { requested: u128, available: u128 },

    #[error("market rejected call: {0}")]
    Rejected(String),
}

impl MarketFault {
    /// Faults that make the market unusable as a whole.
    pub fn is_outage(&self) -> bool {
        matches!(self, MarketFault::Paused | MarketFault::Unreachable)
    }
}

pub type MarketResult<T> = std::result::Result<T, MarketFault>;

/// One external lending market.
///
/// `account` is the supplier position being queried or moved (the
/// adapter's own address).
pub trait LendingMarket: Send + Sync {
    /// The market's own address.
    fn address(&self) -> Address;

    /// Base asset for single-asset markets; `None` for multi-asset pools.
    fn base_asset(&self) -> Option<Address>;

    /// Pull `amount` of `asset` from `account` and credit its position.
    fn supply(&self, account: &Address, asset: &Address, amount: u128) -> MarketResult<()>;

    /// Redeem up to `amount` of `asset` to `account`. Returns the amount
    /// actually paid out.
    fn redeem(&self, account: &Address, asset: &Address, amount: u128) -> MarketResult<u128>;

    /// Redeemable balance of `account`, principal plus interest.
    fn balance_of(&self, account: &Address, asset: &Address) -> MarketResult<u128>;

    /// Cash the market can pay out right now for `asset`.
    fn available_cash(&self, asset: &Address) -> MarketResult<u128>;

    /// Annualized supply rate in basis points.
    fn supply_rate_bps(&self, asset: &Address) -> MarketResult<u32>;

    /// `Ok(true)` when paused, `Err(Unreachable)` when it cannot be reached.
    fn is_paused(&self) -> MarketResult<bool>;
}
