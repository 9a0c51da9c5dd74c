//! Compound-style adapter: one market per asset.
//!
//! Each market declares a single base asset. A market can only be used
//! for the asset it declares; `add_supported_token` checks this and
//! fails with `UnsupportedTokenForPool` on mismatch.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::clock::Clock;
use crate::custody::TokenCustody;
use crate::errors::{Result, VaultError};
use crate::events::EventLog;
use crate::market::LendingMarket;
use crate::state::{Address, StrategyKind};

use super::{LendingAdapter, MarketRouting};

#[derive(Default)]
pub struct CompoundRouting {
    markets: RwLock<HashMap<Address, Arc<dyn LendingMarket>>>,
}

impl MarketRouting for CompoundRouting {
    const KIND: StrategyKind = StrategyKind::Compound;

    fn market_for(&self, asset: &Address) -> Option<Arc<dyn LendingMarket>> {
        self.markets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(asset)
            .cloned()
    }

    fn validate(&self, asset: &Address, market: &dyn LendingMarket) -> Result<()> {
        match market.base_asset() {
            Some(base) if base == *asset => Ok(()),
            base => Err(VaultError::UnsupportedTokenForPool {
                asset: *asset,
                base: base.unwrap_or(Address::ZERO),
            }),
        }
    }

    fn forget(&self, asset: &Address) {
        self.markets
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(asset);
    }
}

pub type CompoundStrategy = LendingAdapter<CompoundRouting>;

impl LendingAdapter<CompoundRouting> {
    pub fn new(
        address: Address,
        owner: Address,
        custody: Arc<dyn TokenCustody>,
        clock: Arc<dyn Clock>,
        events: Arc<EventLog>,
    ) -> Self {
        Self::with_routing(address, owner, CompoundRouting::default(), custody, clock, events)
    }

    /// Register the market serving `asset`.
    ///
    /// Re-registering the same market is a no-op; replacing a market that
    /// still holds funds fails with `TokenHasBalance`.
    pub fn set_market(
        &self,
        caller: &Address,
        asset: Address,
        market: Arc<dyn LendingMarket>,
    ) -> Result<()> {
        self.authority().ensure_owner(caller)?;
        asset.ensure_non_zero("asset")?;
        market.address().ensure_non_zero("market")?;

        if self.market_for(&asset) == Some(market.address()) {
            return Ok(());
        }
        let balance = self.position(&asset).current_balance;
        if balance > 0 {
            return Err(VaultError::TokenHasBalance { asset, balance });
        }

        let address = market.address();
        self.routing()
            .markets
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(asset, market);
        info!("Compound adapter market for {} set to {}", asset, address);
        Ok(())
    }

    pub fn market_for(&self, asset: &Address) -> Option<Address> {
        self.routing().market_for(asset).map(|m| m.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{InMemoryCustody, ManualClock, SimulatedMarket};
    use crate::strategy::StrategyAdapter;

    fn adapter(custody: Arc<InMemoryCustody>) -> CompoundStrategy {
        CompoundStrategy::new(
            Address::from_low_u64(60),
            Address::from_low_u64(1),
            custody,
            Arc::new(ManualClock::new(0)),
            Arc::new(EventLog::default()),
        )
    }

    #[test]
    fn test_market_base_asset_must_match() {
        let admin = Address::from_low_u64(1);
        let usdc = Address::from_low_u64(10);
        let dai = Address::from_low_u64(11);
        let custody = Arc::new(InMemoryCustody::new());
        let adapter = adapter(custody.clone());
        let usdc_market = Arc::new(SimulatedMarket::new(
            Address::from_low_u64(200),
            Some(usdc),
            custody,
            300,
        ));

        adapter.set_market(&admin, dai, usdc_market.clone()).unwrap();
        assert_eq!(
            adapter.add_supported_token(&admin, dai),
            Err(VaultError::UnsupportedTokenForPool {
                asset: dai,
                base: usdc
            })
        );

        adapter.set_market(&admin, usdc, usdc_market).unwrap();
        adapter.add_supported_token(&admin, usdc).unwrap();
        assert!(adapter.is_available(&usdc));
        assert_eq!(adapter.current_apy(&usdc), 300);
        assert_eq!(adapter.current_apy(&dai), 0);
    }

    #[test]
    fn test_remove_clears_market_mapping() {
        let admin = Address::from_low_u64(1);
        let usdc = Address::from_low_u64(10);
        let custody = Arc::new(InMemoryCustody::new());
        let adapter = adapter(custody.clone());
        let market = Arc::new(SimulatedMarket::new(
            Address::from_low_u64(200),
            Some(usdc),
            custody,
            300,
        ));

        adapter.set_market(&admin, usdc, market).unwrap();
        adapter.add_supported_token(&admin, usdc).unwrap();
        adapter.remove_supported_token(&admin, usdc).unwrap();

        assert_eq!(adapter.market_for(&usdc), None);
        assert_eq!(
            adapter.remove_supported_token(&admin, usdc),
            Err(VaultError::TokenSupportUnchanged { asset: usdc })
        );
        assert_eq!(
            adapter.add_supported_token(&admin, usdc),
            Err(VaultError::NoPoolForToken {
                asset: usdc,
                strategy: StrategyKind::Compound
            })
        );
    }

    #[test]
    fn test_remove_refused_while_funded() {
        let admin = Address::from_low_u64(1);
        let coordinator = Address::from_low_u64(2);
        let usdc = Address::from_low_u64(10);
        let custody = Arc::new(InMemoryCustody::new());
        let adapter = adapter(custody.clone());
        let market = Arc::new(SimulatedMarket::new(
            Address::from_low_u64(200),
            Some(usdc),
            custody.clone(),
            300,
        ));

        adapter.set_coordinator(&admin, coordinator).unwrap();
        adapter.set_market(&admin, usdc, market).unwrap();
        adapter.add_supported_token(&admin, usdc).unwrap();
        custody.mint(&usdc, &coordinator, 10).unwrap();
        adapter.deposit(&coordinator, &usdc, 10).unwrap();

        assert_eq!(
            adapter.remove_supported_token(&admin, usdc),
            Err(VaultError::TokenHasBalance {
                asset: usdc,
                balance: 10
            })
        );
    }
}
