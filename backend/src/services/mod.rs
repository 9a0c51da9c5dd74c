//! # Services Module
//!
//! This module contains the business logic services of the Briq
//! backend. Each service handles a specific domain.
//!
//! ## Services Overview
//!
//! | Service | Responsibility |
//! |---------|---------------|
//! | `VaultManager` | Engine ownership, deposits, withdrawals, admin |
//! | `VaultMonitor` | Oracle heartbeat, strategy/price/liquidity alerts |
//! | `BalanceTracker` | Reconciliation, TVL history |
//!
//! ## Service Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        SERVICES LAYER                           │
//! │                                                                 │
//! │  ┌──────────────────────────────────────────────────────────┐   │
//! │  │                    VaultManager                          │   │
//! │  │  • deposit()   • withdraw()   • tvl()   • strategy_info()│   │
//! │  │  • set_strategy()  • set_price_feed()  • market_control()│   │
//! │  └──────────────────────────────────────────────────────────┘   │
//! │                  │                          │                   │
//! │                  ▼                          ▼                   │
//! │          ┌──────────────┐           ┌──────────────┐            │
//! │          │ VaultMonitor │           │BalanceTracker│            │
//! │          │              │           │              │            │
//! │          │ Heartbeat    │──AlertLog─│ Reconcile    │            │
//! │          │ Alerts       │           │ TVL history  │            │
//! │          └──────────────┘           └──────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod balance_tracker;
pub mod vault_manager;
pub mod vault_monitor;

pub use balance_tracker::BalanceTracker;
pub use vault_manager::{ManagerError, VaultManager};
pub use vault_monitor::{AlertLog, VaultMonitor};
