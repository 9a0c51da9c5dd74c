use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::custody::TokenCustody;
use crate::market::{LendingMarket, MarketFault, MarketResult};
use crate::state::Address;

use super::InMemoryCustody;

#[derive(Debug)]
struct MarketState {
    paused: bool,
    reachable: bool,
    default_rate_bps: u32,
    rates: HashMap<Address, u32>,
    /// Supplier positions keyed by (account, asset).
    positions: HashMap<(Address, Address), u128>,
    /// Optional cap on cash paid out per asset, to simulate utilization.
    cash_caps: HashMap<Address, u128>,
}

/// In-memory lending market.
///
/// With `base_asset = None` it behaves like a multi-asset Aave pool; with
/// `Some(token)` it behaves like a single-asset Compound market and
/// rejects every other token.
///
/// ## Failure Knobs
///
/// | Knob | Effect |
/// |------|--------|
/// | `set_paused(true)` | supply/redeem fail with `Paused`, balances readable |
/// | `set_reachable(false)` | every call fails with `Unreachable` |
/// | `set_cash_cap(asset, n)` | redeem pays out at most `n` |
#[derive(Debug)]
pub struct SimulatedMarket {
    address: Address,
    base_asset: Option<Address>,
    custody: Arc<InMemoryCustody>,
    state: RwLock<MarketState>,
}

impl SimulatedMarket {
    pub fn new(
        address: Address,
        base_asset: Option<Address>,
        custody: Arc<InMemoryCustody>,
        default_rate_bps: u32,
    ) -> Self {
        Self {
            address,
            base_asset,
            custody,
            state: RwLock::new(MarketState {
                paused: false,
                reachable: true,
                default_rate_bps,
                rates: HashMap::new(),
                positions: HashMap::new(),
                cash_caps: HashMap::new(),
            }),
        }
    }

    pub fn set_paused(&self, paused: bool) {
        self.state.write().unwrap_or_else(|e| e.into_inner()).paused = paused;
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state.write().unwrap_or_else(|e| e.into_inner()).reachable = reachable;
    }

    pub fn set_rate_bps(&self, asset: Address, rate_bps: u32) {
        self.state
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .rates
            .insert(asset, rate_bps);
    }

    pub fn set_cash_cap(&self, asset: Address, cap: Option<u128>) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        match cap {
            Some(cap) => state.cash_caps.insert(asset, cap),
            None => state.cash_caps.remove(&asset),
        };
    }

    /// Credit `amount` of interest to `account`, backed by freshly minted
    /// tokens held by the market.
    pub fn accrue_interest(&self, account: &Address, asset: &Address, amount: u128) -> MarketResult<()> {
        self.check_asset(asset)?;
        self.custody
            .mint(asset, &self.address, amount)
            .map_err(|e| MarketFault::Rejected(e.to_string()))?;

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let position = state.positions.entry((*account, *asset)).or_insert(0);
        *position = position.saturating_add(amount);
        Ok(())
    }

    fn check_asset(&self, asset: &Address) -> MarketResult<()> {
        match self.base_asset {
            Some(base) if base != *asset => Err(MarketFault::UnknownAsset(*asset)),
            _ => Ok(()),
        }
    }

    fn check_live(&self, state: &MarketState, mutating: bool) -> MarketResult<()> {
        if !state.reachable {
            return Err(MarketFault::Unreachable);
        }
        if mutating && state.paused {
            return Err(MarketFault::Paused);
        }
        Ok(())
    }

    fn cash(&self, state: &MarketState, asset: &Address) -> u128 {
        let held = self.custody.balance_of(asset, &self.address);
        match state.cash_caps.get(asset) {
            Some(cap) => held.min(*cap),
            None => held,
        }
    }
}

impl LendingMarket for SimulatedMarket {
    fn address(&self) -> Address {
        self.address
    }

    fn base_asset(&self) -> Option<Address> {
        self.base_asset
    }

    fn supply(&self, account: &Address, asset: &Address, amount: u128) -> MarketResult<()> {
        self.check_asset(asset)?;
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        self.check_live(&state, true)?;

        self.custody
            .transfer(asset, account, &self.address, amount)
            .map_err(|e| MarketFault::Rejected(e.to_string()))?;

        let position = state.positions.entry((*account, *asset)).or_insert(0);
        *position = position.saturating_add(amount);
        debug!("market {} supplied {} of {} for {}", self.address, amount, asset, account);
        Ok(())
    }

    fn redeem(&self, account: &Address, asset: &Address, amount: u128) -> MarketResult<u128> {
        self.check_asset(asset)?;
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        self.check_live(&state, true)?;

        let position = state.positions.get(&(*account, *asset)).copied().unwrap_or(0);
        let cash = self.cash(&state, asset);
        let paid = amount.min(position).min(cash);

        if paid == 0 && amount > 0 && position > 0 {
            return Err(MarketFault::InsufficientCash {
                requested: amount,
                available: cash,
            });
        }

        self.custody
            .transfer(asset, &self.address, account, paid)
            .map_err(|e| MarketFault::Rejected(e.to_string()))?;
        state.positions.insert((*account, *asset), position - paid);
        if let Some(cap) = state.cash_caps.get_mut(asset) {
            *cap = cap.saturating_sub(paid);
        }

        debug!("market {} redeemed {} of {} for {}", self.address, paid, asset, account);
        Ok(paid)
    }

    fn balance_of(&self, account: &Address, asset: &Address) -> MarketResult<u128> {
        self.check_asset(asset)?;
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        self.check_live(&state, false)?;
        Ok(state.positions.get(&(*account, *asset)).copied().unwrap_or(0))
    }

    fn available_cash(&self, asset: &Address) -> MarketResult<u128> {
        self.check_asset(asset)?;
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        self.check_live(&state, false)?;
        Ok(self.cash(&state, asset))
    }

    fn supply_rate_bps(&self, asset: &Address) -> MarketResult<u32> {
        self.check_asset(asset)?;
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        self.check_live(&state, false)?;
        Ok(state.rates.get(asset).copied().unwrap_or(state.default_rate_bps))
    }

    fn is_paused(&self) -> MarketResult<bool> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        if !state.reachable {
            return Err(MarketFault::Unreachable);
        }
        Ok(state.paused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supply_redeem_with_interest() {
        let custody = Arc::new(InMemoryCustody::new());
        let usdc = Address::from_low_u64(1);
        let adapter = Address::from_low_u64(2);
        let market = SimulatedMarket::new(Address::from_low_u64(3), None, custody.clone(), 450);

        custody.mint(&usdc, &adapter, 1_000).unwrap();
        market.supply(&adapter, &usdc, 1_000).unwrap();
        market.accrue_interest(&adapter, &usdc, 25).unwrap();
        assert_eq!(market.balance_of(&adapter, &usdc).unwrap(), 1_025);

        assert_eq!(market.redeem(&adapter, &usdc, 2_000).unwrap(), 1_025);
        assert_eq!(custody.balance_of(&usdc, &adapter), 1_025);
    }

    #[test]
    fn test_base_asset_and_outages() {
        let custody = Arc::new(InMemoryCustody::new());
        let usdc = Address::from_low_u64(1);
        let dai = Address::from_low_u64(4);
        let adapter = Address::from_low_u64(2);
        let market = SimulatedMarket::new(Address::from_low_u64(3), Some(usdc), custody.clone(), 300);

        assert_eq!(
            market.supply(&adapter, &dai, 1),
            Err(MarketFault::UnknownAsset(dai))
        );

        market.set_paused(true);
        assert_eq!(market.supply(&adapter, &usdc, 1), Err(MarketFault::Paused));
        assert_eq!(market.balance_of(&adapter, &usdc), Ok(0));

        market.set_reachable(false);
        assert_eq!(market.is_paused(), Err(MarketFault::Unreachable));
    }

    #[test]
    fn test_cash_cap_limits_redemption() {
        let custody = Arc::new(InMemoryCustody::new());
        let usdc = Address::from_low_u64(1);
        let adapter = Address::from_low_u64(2);
        let market = SimulatedMarket::new(Address::from_low_u64(3), None, custody.clone(), 0);

        custody.mint(&usdc, &adapter, 500).unwrap();
        market.supply(&adapter, &usdc, 500).unwrap();
        market.set_cash_cap(usdc, Some(200));

        assert_eq!(market.redeem(&adapter, &usdc, 500).unwrap(), 200);
        assert_eq!(market.balance_of(&adapter, &usdc).unwrap(), 300);
        assert!(matches!(
            market.redeem(&adapter, &usdc, 1),
            Err(MarketFault::InsufficientCash { .. })
        ));
    }
}
