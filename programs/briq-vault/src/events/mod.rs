//! # Events Module
//!
//! Every state change in the engine emits a typed event. Events do not
//! affect state but are used for:
//!
//! 1. **Analytics**: deposit volumes, failover frequency, TVL movement
//! 2. **Monitoring**: the backend polls recent events for alerting
//! 3. **Audit trail**: who changed which configuration and when
//!
//! ## Event Flow:
//! ```text
//! User deposits USDC
//!        ↓
//! Adapter emits Deposited, Vault emits UserDeposited
//!        ↓
//! EventLog records both and logs them via tracing
//!        ↓
//! Backend /monitor/events serves the most recent ones
//! ```

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;
use tracing::info;

use crate::state::{Address, StrategyKind};

/// Emitted when a price feed is registered or replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceFeedUpdated {
    pub asset: Address,
    pub oracle: Address,
    pub decimals: u8,
    pub timestamp: i64,
}

/// Emitted when the freshness window changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StalenessWindowUpdated {
    pub old_seconds: u64,
    pub new_seconds: u64,
    pub timestamp: i64,
}

/// Emitted once, when the share ledger learns its vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareVaultSet {
    pub vault: Address,
    pub timestamp: i64,
}

/// Emitted on every share mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharesMinted {
    pub to: Address,
    pub amount: u128,
    pub total_supply: u128,
    pub timestamp: i64,
}

/// Emitted on every share burn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharesBurned {
    pub from: Address,
    pub amount: u128,
    pub total_supply: u128,
    pub timestamp: i64,
}

/// Emitted when an adapter starts or stops supporting an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSupportChanged {
    pub strategy: StrategyKind,
    pub asset: Address,
    pub supported: bool,
    pub timestamp: i64,
}

/// Emitted when an adapter's coordinator is (re)assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorUpdated {
    pub strategy: StrategyKind,
    pub coordinator: Address,
    pub timestamp: i64,
}

/// Emitted by an adapter after funds reach its market.
///
/// ## Example Log:
/// ```text
/// Deposited {
///     strategy: Aave,
///     asset: 0xa0b8...eb48,
///     amount: 100_000_000,              // 100 USDC
///     total_deposited: 250_000_000,
///     timestamp: 1699123456
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deposited {
    pub strategy: StrategyKind,
    pub asset: Address,
    pub amount: u128,
    pub total_deposited: u128,
    pub timestamp: i64,
}

/// Emitted by an adapter after redeeming from its market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawn {
    pub strategy: StrategyKind,
    pub asset: Address,
    pub requested: u128,
    pub redeemed: u128,
    pub total_withdrawn: u128,
    pub timestamp: i64,
}

/// Emitted when the preferred adapter for an asset changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyAssigned {
    pub asset: Address,
    pub strategy: StrategyKind,
    pub timestamp: i64,
}

/// Emitted when the coordinator routes around the preferred adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyFailover {
    pub asset: Address,
    pub preferred: StrategyKind,
    pub used: StrategyKind,
    pub amount: u128,
    pub timestamp: i64,
}

/// Emitted for both emergency paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyWithdrawal {
    pub asset: Address,
    pub strategy: StrategyKind,
    pub amount: u128,
    pub recipient: Address,
    pub timestamp: i64,
}

/// Emitted when the coordinator's vault address changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultAddressUpdated {
    pub vault: Address,
    pub timestamp: i64,
}

/// Emitted when a user deposits into the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDeposited {
    pub user: Address,
    pub asset: Address,
    pub amount: u128,
    pub shares_minted: u128,
    pub usd_value: u128,
    pub timestamp: i64,
}

/// Emitted when a user withdraws from the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserWithdrew {
    pub user: Address,
    pub asset: Address,
    pub amount_out: u128,
    pub shares_burned: u128,
    pub timestamp: i64,
}

/// Emitted when the vault switches price feed managers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceFeedManagerUpdated {
    pub manager: Address,
    pub timestamp: i64,
}

/// Emitted on pause/unpause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultPauseChanged {
    pub paused: bool,
    pub timestamp: i64,
}

/// Emitted when the vault lists or delists an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedTokenChanged {
    pub asset: Address,
    pub supported: bool,
    pub timestamp: i64,
}

/// Any engine event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum VaultEvent {
    PriceFeedUpdated(PriceFeedUpdated),
    StalenessWindowUpdated(StalenessWindowUpdated),
    ShareVaultSet(ShareVaultSet),
    SharesMinted(SharesMinted),
    SharesBurned(SharesBurned),
    TokenSupportChanged(TokenSupportChanged),
    CoordinatorUpdated(CoordinatorUpdated),
    Deposited(Deposited),
    Withdrawn(Withdrawn),
    StrategyAssigned(StrategyAssigned),
    StrategyFailover(StrategyFailover),
    EmergencyWithdrawal(EmergencyWithdrawal),
    VaultAddressUpdated(VaultAddressUpdated),
    UserDeposited(UserDeposited),
    UserWithdrew(UserWithdrew),
    PriceFeedManagerUpdated(PriceFeedManagerUpdated),
    VaultPauseChanged(VaultPauseChanged),
    SupportedTokenChanged(SupportedTokenChanged),
}

impl VaultEvent {
    pub fn name(&self) -> &'static str {
        match self {
            VaultEvent::PriceFeedUpdated(_) => "PriceFeedUpdated",
            VaultEvent::StalenessWindowUpdated(_) => "StalenessWindowUpdated",
            VaultEvent::ShareVaultSet(_) => "ShareVaultSet",
            VaultEvent::SharesMinted(_) => "SharesMinted",
            VaultEvent::SharesBurned(_) => "SharesBurned",
            VaultEvent::TokenSupportChanged(_) => "TokenSupportChanged",
            VaultEvent::CoordinatorUpdated(_) => "CoordinatorUpdated",
            VaultEvent::Deposited(_) => "Deposited",
            VaultEvent::Withdrawn(_) => "Withdrawn",
            VaultEvent::StrategyAssigned(_) => "StrategyAssigned",
            VaultEvent::StrategyFailover(_) => "StrategyFailover",
            VaultEvent::EmergencyWithdrawal(_) => "EmergencyWithdrawal",
            VaultEvent::VaultAddressUpdated(_) => "VaultAddressUpdated",
            VaultEvent::UserDeposited(_) => "UserDeposited",
            VaultEvent::UserWithdrew(_) => "UserWithdrew",
            VaultEvent::PriceFeedManagerUpdated(_) => "PriceFeedManagerUpdated",
            VaultEvent::VaultPauseChanged(_) => "VaultPauseChanged",
            VaultEvent::SupportedTokenChanged(_) => "SupportedTokenChanged",
        }
    }
}

macro_rules! impl_from_event {
    ($($name:ident),* $(,)?) => {
        $(
            impl From<$name> for VaultEvent {
                fn from(event: $name) -> Self {
                    VaultEvent::$name(event)
                }
            }
        )*
    };
}

impl_from_event!(
    PriceFeedUpdated,
    StalenessWindowUpdated,
    ShareVaultSet,
    SharesMinted,
    SharesBurned,
    TokenSupportChanged,
    CoordinatorUpdated,
    Deposited,
    Withdrawn,
    StrategyAssigned,
    StrategyFailover,
    EmergencyWithdrawal,
    VaultAddressUpdated,
    UserDeposited,
    UserWithdrew,
    PriceFeedManagerUpdated,
    VaultPauseChanged,
    SupportedTokenChanged,
);

/// Bounded in-memory event sink shared by all components.
///
/// Oldest events are dropped once `capacity` is reached.
#[derive(Debug)]
pub struct EventLog {
    capacity: usize,
    events: Mutex<VecDeque<VaultEvent>>,
}

impl EventLog {
    pub const DEFAULT_CAPACITY: usize = 1_024;

    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            events: Mutex::new(VecDeque::new()),
        }
    }

    pub fn emit(&self, event: impl Into<VaultEvent>) {
        let event = event.into();
        info!(event = event.name(), "{:?}", event);

        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Up to `limit` most recent events, newest last.
    pub fn recent(&self, limit: usize) -> Vec<VaultEvent> {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        let skip = events.len().saturating_sub(limit);
        events.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_log_is_bounded() {
        let log = EventLog::new(2);
        for paused in [true, false, true] {
            log.emit(VaultPauseChanged {
                paused,
                timestamp: 0,
            });
        }
        assert_eq!(log.len(), 2);
        let recent = log.recent(10);
        assert_eq!(
            recent.last(),
            Some(&VaultEvent::VaultPauseChanged(VaultPauseChanged {
                paused: true,
                timestamp: 0
            }))
        );
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event: VaultEvent = StrategyAssigned {
            asset: Address::from_low_u64(1),
            strategy: StrategyKind::Compound,
            timestamp: 5,
        }
        .into();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "StrategyAssigned");
        assert_eq!(json["data"]["strategy"], "compound");
    }
}
