//! # Briq Vault
//!
//! A multi-asset yield routing vault. Users deposit any supported token
//! and receive fungible shares priced in USD; the vault places the
//! deposit with an Aave-style or Compound-style lending market and
//! redeems it on withdrawal.
//!
//! ## Overview
//!
//! - **Deposits**: token in, USD-normalized shares out
//! - **Withdrawals**: shares in, any supported token out
//! - **Routing**: one preferred strategy per asset, one failover attempt
//! - **Valuation**: oracle prices with a freshness window
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           BRIQ VAULT                            │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────────┐   ┌────────────────┐   │
//! │  │  BriqShares  │◀──│    BriqVault     │──▶│PriceFeedManager│   │
//! │  │ (share token)│   │ deposit/withdraw │   │ token → USD    │   │
//! │  └──────────────┘   └────────┬─────────┘   └────────────────┘   │
//! │                              │                                  │
//! │                   ┌──────────▼──────────┐                       │
//! │                   │ StrategyCoordinator │                       │
//! │                   │ routing + failover  │                       │
//! │                   └─────┬─────────┬─────┘                       │
//! │                         │         │                             │
//! │              ┌──────────▼──┐   ┌──▼───────────────┐             │
//! │              │AaveStrategy │   │ CompoundStrategy │             │
//! │              └──────┬──────┘   └────────┬─────────┘             │
//! └─────────────────────┼───────────────────┼───────────────────────┘
//!                       ▼                   ▼
//!               LendingMarket (pool)  LendingMarket (per asset)
//! ```
//!
//! Every token movement goes through [`custody::TokenCustody`]; every
//! timestamp comes from [`clock::Clock`]. The [`sim`] module provides
//! in-memory implementations of both, plus markets and oracles.
//!
//! ## Operations Summary
//!
//! | Operation | Component | Who Can Call |
//! |-----------|-----------|--------------|
//! | `deposit` / `withdraw` | [`BriqVault`] | Any user |
//! | `add_supported_token` / `remove_supported_token` | [`BriqVault`], adapters | Owner |
//! | `set_price_feed` / `set_staleness_window` | [`PriceFeedManager`] | Owner |
//! | `set_strategy_for_token` | [`StrategyCoordinator`] | Owner |
//! | `emergency_withdraw` | [`StrategyCoordinator`] | Vault, owner, operator |
//! | `mint` / `burn` | [`BriqShares`] | Vault |
//!
//! ## Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use briq_vault::sim::{AssetListing, SimDeployment, ManualClock};
//! use briq_vault::{Address, StrategyKind};
//!
//! let admin = Address::from_low_u64(1);
//! let sim = SimDeployment::new(admin, Arc::new(ManualClock::new(0))).unwrap();
//! let usdc = Address::from_low_u64(10);
//! sim.list_asset(AssetListing {
//!     symbol: "USDC".to_string(),
//!     address: usdc,
//!     decimals: 6,
//!     price: 100_000_000,
//!     strategy: StrategyKind::Aave,
//!     compound_rate_bps: 300,
//! })
//! .unwrap();
//!
//! let alice = Address::from_low_u64(2);
//! sim.fund(&alice, &usdc, 100_000_000).unwrap();
//! let receipt = sim.vault.deposit(&alice, &usdc, 100_000_000).unwrap();
//! assert_eq!(receipt.shares_minted, 100 * briq_vault::math::WAD);
//! ```

pub mod clock;
pub mod coordinator;
pub mod custody;
pub mod errors;
pub mod events;
pub mod locks;
pub mod market;
pub mod math;
pub mod price_feed;
pub mod share_ledger;
pub mod sim;
pub mod state;
pub mod strategy;
pub mod vault;

pub use coordinator::StrategyCoordinator;
pub use errors::{ErrorCategory, Result, VaultError};
pub use events::{EventLog, VaultEvent};
pub use price_feed::PriceFeedManager;
pub use share_ledger::BriqShares;
pub use state::{Address, Liquidity, StrategyKind, TokenAnalytics};
pub use strategy::{AaveStrategy, CompoundStrategy, StrategyAdapter};
pub use vault::{BriqVault, DepositReceipt, SharePricing, WithdrawReceipt};
