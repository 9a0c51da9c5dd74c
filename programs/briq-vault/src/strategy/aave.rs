//! Aave-style adapter: every supported asset goes to one shared pool.

use std::sync::{Arc, RwLock};

use tracing::info;

use crate::clock::Clock;
use crate::custody::TokenCustody;
use crate::errors::{Result, VaultError};
use crate::events::EventLog;
use crate::market::LendingMarket;
use crate::state::{Address, StrategyKind};

use super::{LendingAdapter, MarketRouting, StrategyAdapter};

/// Routing for a single multi-asset pool.
#[derive(Default)]
pub struct AaveRouting {
    pool: RwLock<Option<Arc<dyn LendingMarket>>>,
}

impl MarketRouting for AaveRouting {
    const KIND: StrategyKind = StrategyKind::Aave;

    fn market_for(&self, _asset: &Address) -> Option<Arc<dyn LendingMarket>> {
        self.pool.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn validate(&self, _asset: &Address, _market: &dyn LendingMarket) -> Result<()> {
        Ok(())
    }

    fn forget(&self, _asset: &Address) {}
}

pub type AaveStrategy = LendingAdapter<AaveRouting>;

impl LendingAdapter<AaveRouting> {
    pub fn new(
        address: Address,
        owner: Address,
        custody: Arc<dyn TokenCustody>,
        clock: Arc<dyn Clock>,
        events: Arc<EventLog>,
    ) -> Self {
        Self::with_routing(address, owner, AaveRouting::default(), custody, clock, events)
    }

    /// Point the adapter at its pool.
    ///
    /// Refused with `TokenHasBalance` while funds sit in the current pool.
    pub fn set_pool(&self, caller: &Address, pool: Arc<dyn LendingMarket>) -> Result<()> {
        self.authority().ensure_owner(caller)?;
        pool.address().ensure_non_zero("pool")?;

        for asset in self.supported_tokens() {
            let balance = self.position(&asset).current_balance;
            if balance > 0 {
                return Err(VaultError::TokenHasBalance { asset, balance });
            }
        }

        let address = pool.address();
        *self.routing().pool.write().unwrap_or_else(|e| e.into_inner()) = Some(pool);
        info!("Aave adapter pool set to {}", address);
        Ok(())
    }

    pub fn pool(&self) -> Option<Address> {
        self.routing()
            .pool
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|p| p.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{InMemoryCustody, ManualClock, SimulatedMarket};
    use pretty_assertions::assert_eq;

    struct Fixture {
        adapter: AaveStrategy,
        pool: Arc<SimulatedMarket>,
        custody: Arc<InMemoryCustody>,
        admin: Address,
        coordinator: Address,
        usdc: Address,
    }

    fn fixture() -> Fixture {
        let admin = Address::from_low_u64(1);
        let coordinator = Address::from_low_u64(2);
        let usdc = Address::from_low_u64(10);
        let custody = Arc::new(InMemoryCustody::new());
        let pool = Arc::new(SimulatedMarket::new(
            Address::from_low_u64(100),
            None,
            custody.clone(),
            420,
        ));
        let adapter = AaveStrategy::new(
            Address::from_low_u64(50),
            admin,
            custody.clone(),
            Arc::new(ManualClock::new(0)),
            Arc::new(EventLog::default()),
        );
        adapter.set_coordinator(&admin, coordinator).unwrap();
        Fixture {
            adapter,
            pool,
            custody,
            admin,
            coordinator,
            usdc,
        }
    }

    #[test]
    fn test_add_requires_pool_and_is_not_repeatable() {
        let f = fixture();
        assert_eq!(
            f.adapter.add_supported_token(&f.admin, f.usdc),
            Err(VaultError::NoPoolForToken {
                asset: f.usdc,
                strategy: StrategyKind::Aave
            })
        );

        f.adapter.set_pool(&f.admin, f.pool.clone()).unwrap();
        f.adapter.add_supported_token(&f.admin, f.usdc).unwrap();
        assert_eq!(
            f.adapter.add_supported_token(&f.admin, f.usdc),
            Err(VaultError::TokenSupportUnchanged { asset: f.usdc })
        );
        assert_eq!(f.adapter.supported_tokens(), vec![f.usdc]);
    }

    #[test]
    fn test_deposit_and_withdraw_track_position() {
        let f = fixture();
        f.adapter.set_pool(&f.admin, f.pool.clone()).unwrap();
        f.adapter.add_supported_token(&f.admin, f.usdc).unwrap();
        f.custody.mint(&f.usdc, &f.coordinator, 1_000).unwrap();

        f.adapter.deposit(&f.coordinator, &f.usdc, 1_000).unwrap();
        f.pool
            .accrue_interest(&f.adapter.address(), &f.usdc, 50)
            .unwrap();
        assert_eq!(f.adapter.balance_of(&f.usdc).unwrap(), 1_050);

        let redeemed = f.adapter.withdraw(&f.coordinator, &f.usdc, 400).unwrap();
        assert_eq!(redeemed, 400);
        assert_eq!(f.custody.balance_of(&f.usdc, &f.coordinator), 400);

        let analytics = f.adapter.token_analytics(&f.usdc);
        assert_eq!(analytics.current_balance, 650);
        assert_eq!(analytics.net_deposits, 600);
        assert_eq!(analytics.accrued_rewards, 50);
        assert_eq!(analytics.current_apy_bps, 420);
    }

    #[test]
    fn test_withdraw_clamps_to_position() {
        let f = fixture();
        f.adapter.set_pool(&f.admin, f.pool.clone()).unwrap();
        f.adapter.add_supported_token(&f.admin, f.usdc).unwrap();
        f.custody.mint(&f.usdc, &f.coordinator, 300).unwrap();
        f.adapter.deposit(&f.coordinator, &f.usdc, 300).unwrap();

        assert_eq!(f.adapter.withdraw(&f.coordinator, &f.usdc, 500).unwrap(), 300);
        assert_eq!(f.adapter.withdraw(&f.coordinator, &f.usdc, 1).unwrap(), 0);
    }

    #[test]
    fn test_only_coordinator_moves_funds() {
        let f = fixture();
        f.adapter.set_pool(&f.admin, f.pool.clone()).unwrap();
        f.adapter.add_supported_token(&f.admin, f.usdc).unwrap();
        assert_eq!(
            f.adapter.deposit(&f.admin, &f.usdc, 1),
            Err(VaultError::OnlyCoordinator { caller: f.admin })
        );
    }

    #[test]
    fn test_failed_supply_refunds_coordinator() {
        let f = fixture();
        f.adapter.set_pool(&f.admin, f.pool.clone()).unwrap();
        f.adapter.add_supported_token(&f.admin, f.usdc).unwrap();
        f.custody.mint(&f.usdc, &f.coordinator, 100).unwrap();
        f.pool.set_paused(true);

        assert_eq!(
            f.adapter.deposit(&f.coordinator, &f.usdc, 100),
            Err(VaultError::StrategyUnavailable {
                strategy: StrategyKind::Aave,
                asset: f.usdc
            })
        );
        assert_eq!(f.custody.balance_of(&f.usdc, &f.coordinator), 100);
        assert!(!f.adapter.is_available(&f.usdc));
        assert_eq!(f.adapter.position(&f.usdc).total_deposited, 0);
    }

    #[test]
    fn test_unreachable_market_with_funds_is_not_silently_zero() {
        let f = fixture();
        f.adapter.set_pool(&f.admin, f.pool.clone()).unwrap();
        f.adapter.add_supported_token(&f.admin, f.usdc).unwrap();
        f.custody.mint(&f.usdc, &f.coordinator, 100).unwrap();
        f.adapter.deposit(&f.coordinator, &f.usdc, 100).unwrap();

        f.pool.set_reachable(false);
        assert!(f.adapter.balance_of(&f.usdc).is_err());
        assert_eq!(f.adapter.available_liquidity(&f.usdc), 0);
        assert_eq!(f.adapter.current_apy(&f.usdc), 0);
    }
}
