//! # Strategy Position Structures
//!
//! Per-(adapter, asset) accounting kept by each strategy adapter, and the
//! read-only views the coordinator and analytics consumers see.
//!
//! ## Principal vs. Yield
//!
//! ```text
//! total_deposited:  1_000   (every unit ever supplied)
//! total_withdrawn:    400   (every unit ever redeemed)
//! net_deposits:       600   (principal still placed)
//! current_balance:    612   (live, principal + interest)
//! accrued_rewards:     12   (current_balance - net_deposits, never < 0)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Address;

/// The two interchangeable lending backends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Single shared pool for every supported asset.
    #[default]
    Aave,
    /// One market per asset, each declaring its base asset.
    Compound,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 2] = [StrategyKind::Aave, StrategyKind::Compound];

    /// The failover target.
    pub fn alternate(self) -> Self {
        match self {
            StrategyKind::Aave => StrategyKind::Compound,
            StrategyKind::Compound => StrategyKind::Aave,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Aave => write!(f, "Aave"),
            StrategyKind::Compound => write!(f, "Compound"),
        }
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aave" => Ok(StrategyKind::Aave),
            "compound" => Ok(StrategyKind::Compound),
            other => Err(format!("unknown strategy '{}'", other)),
        }
    }
}

/// # StrategyPosition
///
/// Owned and mutated only by the adapter it belongs to. Created on first
/// support/deposit, zeroed but never deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyPosition {
    /// Last observed redeemable balance (principal + interest), native decimals.
    pub current_balance: u128,

    /// Cumulative amount supplied to the market.
    pub total_deposited: u128,

    /// Cumulative amount redeemed from the market.
    pub total_withdrawn: u128,

    /// Whether the adapter currently accepts this asset.
    pub supported: bool,
}

impl StrategyPosition {
    /// Principal still placed. Saturates at zero.
    pub fn net_deposits(&self) -> u128 {
        self.total_deposited.saturating_sub(self.total_withdrawn)
    }

    /// Yield above principal, clamped so rounding never shows a loss.
    pub fn accrued_rewards(&self) -> u128 {
        self.current_balance.saturating_sub(self.net_deposits())
    }

    pub fn record_deposit(&mut self, amount: u128, live_balance: u128) -> Option<()> {
        self.total_deposited = self.total_deposited.checked_add(amount)?;
        self.current_balance = live_balance;
        Some(())
    }

    pub fn record_withdrawal(&mut self, amount: u128, live_balance: u128) -> Option<()> {
        self.total_withdrawn = self.total_withdrawn.checked_add(amount)?;
        self.current_balance = live_balance;
        Some(())
    }
}

/// Read-only analytics row for one (adapter, asset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAnalytics {
    pub strategy: StrategyKind,
    pub asset: Address,
    pub current_balance: u128,
    pub total_deposited: u128,
    pub total_withdrawn: u128,
    pub net_deposits: u128,
    pub accrued_rewards: u128,
    /// Incentive rewards paid by the protocol on top of interest. The
    /// simulated markets pay none.
    pub protocol_rewards: u128,
    /// Annualized supply rate in basis points.
    pub current_apy_bps: u32,
}

/// Redeemable liquidity for one asset, split by adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Liquidity {
    pub total: u128,
    pub from_aave: u128,
    pub from_compound: u128,
}

impl Liquidity {
    pub fn from_kind(&self, kind: StrategyKind) -> u128 {
        match kind {
            StrategyKind::Aave => self.from_aave,
            StrategyKind::Compound => self.from_compound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewards_are_clamped() {
        let pos = StrategyPosition {
            current_balance: 599,
            total_deposited: 1_000,
            total_withdrawn: 400,
            supported: true,
        };
        assert_eq!(pos.net_deposits(), 600);
        assert_eq!(pos.accrued_rewards(), 0);

        let pos = StrategyPosition {
            current_balance: 612,
            ..pos
        };
        assert_eq!(pos.accrued_rewards(), 12);
    }

    #[test]
    fn test_strategy_kind_parsing() {
        assert_eq!("AAVE".parse::<StrategyKind>().unwrap(), StrategyKind::Aave);
        assert_eq!(StrategyKind::Aave.alternate(), StrategyKind::Compound);
        assert!("maker".parse::<StrategyKind>().is_err());
    }
}
