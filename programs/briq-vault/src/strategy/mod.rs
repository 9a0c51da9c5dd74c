//! # Strategy Adapters
//!
//! A strategy adapter wraps one external lending market behind a fixed
//! contract. The coordinator holds one adapter of each [`StrategyKind`]
//! and talks to both through [`StrategyAdapter`].
//!
//! ## Adapter Matrix
//!
//! | | [`AaveStrategy`] | [`CompoundStrategy`] |
//! |---|---|---|
//! | Market wiring | one shared pool | one market per asset |
//! | `add_supported_token` needs | pool set | market set for the asset |
//! | Extra validation | none | market base asset == asset |
//! | `remove_supported_token` | clears support flag | also forgets the market |
//!
//! Everything else (position accounting, coordinator gating, custody
//! movements, analytics) is shared in [`LendingAdapter`].

use crate::errors::Result;
use crate::state::{Address, StrategyKind, TokenAnalytics};

pub mod adapter;
pub mod aave;
pub mod compound;

pub use aave::{AaveRouting, AaveStrategy};
pub use adapter::{LendingAdapter, MarketRouting};
pub use compound::{CompoundRouting, CompoundStrategy};

/// Uniform interface over one lending backend.
///
/// Mutating calls take the caller's address; deposits and withdrawals are
/// accepted only from the registered coordinator, configuration only
/// from the owner.
pub trait StrategyAdapter: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// The adapter's own account, which holds its market positions.
    fn address(&self) -> Address;

    // ---- configuration (owner) ----

    fn add_supported_token(&self, caller: &Address, asset: Address) -> Result<()>;

    fn remove_supported_token(&self, caller: &Address, asset: Address) -> Result<()>;

    fn set_coordinator(&self, caller: &Address, coordinator: Address) -> Result<()>;

    fn set_paused(&self, caller: &Address, paused: bool) -> Result<()>;

    // ---- fund movement (coordinator) ----

    /// Pull `amount` from the coordinator and supply it to the market.
    fn deposit(&self, caller: &Address, asset: &Address, amount: u128) -> Result<()>;

    /// Redeem up to `amount` and send it to the coordinator. Returns the
    /// amount actually redeemed, which is less than requested when the
    /// position or the market's cash is short.
    /// Refused with `StrategyUnavailable` while the adapter is paused.
    fn withdraw(&self, caller: &Address, asset: &Address, amount: u128) -> Result<u128>;

    /// Same as `withdraw` but ignores the adapter's pause switch, so funds
    /// can still be pulled out of a paused adapter.
    fn emergency_withdraw(&self, caller: &Address, asset: &Address, amount: u128) -> Result<u128>;

    // ---- queries (never mutate) ----

    fn coordinator(&self) -> Option<Address>;

    fn is_paused(&self) -> bool;

    fn is_supported(&self, asset: &Address) -> bool;

    /// Not paused, asset supported, market reachable and not paused.
    fn is_available(&self, asset: &Address) -> bool;

    /// Live redeemable balance. `Ok(0)` for assets never placed here;
    /// `StrategyUnavailable` when the market holding funds cannot be read.
    fn balance_of(&self, asset: &Address) -> Result<u128>;

    /// What a withdrawal could obtain right now. Zero when unavailable or
    /// paused.
    fn available_liquidity(&self, asset: &Address) -> u128;

    /// Annualized supply rate in basis points; 0 when unknown.
    fn current_apy(&self, asset: &Address) -> u32;

    fn supported_tokens(&self) -> Vec<Address>;

    fn token_analytics(&self, asset: &Address) -> TokenAnalytics;

    fn all_token_analytics(&self) -> Vec<TokenAnalytics>;
}
