//! # Strategy Coordinator
//!
//! Routes each asset to one preferred adapter, fails over to the other
//! when the preferred one is unavailable, and aggregates balances and
//! liquidity across both.
//!
//! ## Routing
//!
//! ```text
//!                  deposit(asset, amount)
//!                           │
//!            preferred = assignment[asset] (default Aave)
//!                           │
//!          ┌────────────────┴────────────────┐
//!   preferred available?               alternate available?
//!          │ yes                              │ yes
//!   adapter.deposit ──backend error──▶ adapter.deposit (one attempt)
//!          │                                  │
//!          └──────────── Ok(kind) ◀───────────┘
//!
//! neither supports the asset     → UnsupportedToken
//! supported but none available   → NoStrategyAvailable
//! ```
//!
//! Withdrawals draw from the preferred adapter first and take any
//! remainder from the alternate. If the combined redeemable liquidity is
//! short, the call fails before touching anything; if a market pays out
//! less than it advertised, everything already redeemed is put back and
//! the call fails.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::custody::TokenCustody;
use crate::errors::{Result, VaultError};
use crate::events::{EmergencyWithdrawal, EventLog, StrategyAssigned, StrategyFailover, VaultAddressUpdated};
use crate::locks::AssetLocks;
use crate::price_feed::PriceFeedManager;
use crate::state::{Address, Authority, Liquidity, StrategyKind, TokenAnalytics};
use crate::strategy::StrategyAdapter;

/// # StrategyCoordinator
///
/// ## Who Can Call What
///
/// | Operation | Caller |
/// |-----------|--------|
/// | `set_strategy_for_token`, `update_vault_address`, `update_strategy_adapter` | owner |
/// | `deposit`, `withdraw` | registered vault |
/// | `emergency_withdraw*` | vault, owner or operator |
/// | queries | anyone |
pub struct StrategyCoordinator {
    address: Address,
    authority: Authority,
    vault: RwLock<Option<Address>>,
    aave: RwLock<Arc<dyn StrategyAdapter>>,
    compound: RwLock<Arc<dyn StrategyAdapter>>,
    assignments: RwLock<HashMap<Address, StrategyKind>>,
    locks: AssetLocks,
    custody: Arc<dyn TokenCustody>,
    clock: Arc<dyn Clock>,
    events: Arc<EventLog>,
}

impl StrategyCoordinator {
    pub fn new(
        address: Address,
        owner: Address,
        aave: Arc<dyn StrategyAdapter>,
        compound: Arc<dyn StrategyAdapter>,
        custody: Arc<dyn TokenCustody>,
        clock: Arc<dyn Clock>,
        events: Arc<EventLog>,
    ) -> Self {
        debug_assert_eq!(aave.kind(), StrategyKind::Aave);
        debug_assert_eq!(compound.kind(), StrategyKind::Compound);
        Self {
            address,
            authority: Authority::new(owner),
            vault: RwLock::new(None),
            aave: RwLock::new(aave),
            compound: RwLock::new(compound),
            assignments: RwLock::new(HashMap::new()),
            locks: AssetLocks::new(),
            custody,
            clock,
            events,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn adapter(&self, kind: StrategyKind) -> Arc<dyn StrategyAdapter> {
        let slot = match kind {
            StrategyKind::Aave => &self.aave,
            StrategyKind::Compound => &self.compound,
        };
        slot.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn vault(&self) -> Option<Address> {
        *self.vault.read().unwrap_or_else(|e| e.into_inner())
    }

    // ========================================
    // ADMIN CONFIGURATION
    // ========================================

    /// Set the vault allowed to deposit and withdraw. Same value is a no-op.
    pub fn update_vault_address(&self, caller: &Address, vault: Address) -> Result<()> {
        self.authority.ensure_owner(caller)?;
        vault.ensure_non_zero("vault")?;

        let mut current = self.vault.write().unwrap_or_else(|e| e.into_inner());
        if *current == Some(vault) {
            return Ok(());
        }
        *current = Some(vault);
        drop(current);

        self.events.emit(VaultAddressUpdated {
            vault,
            timestamp: self.clock.now(),
        });
        info!("Coordinator vault set to {}", vault);
        Ok(())
    }

    /// Record the preferred adapter for new deposits of `asset`.
    pub fn set_strategy_for_token(&self, caller: &Address, asset: Address, kind: StrategyKind) -> Result<()> {
        self.authority.ensure_owner(caller)?;
        asset.ensure_non_zero("asset")?;

        let previous = self
            .assignments
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(asset, kind);
        if previous != Some(kind) {
            self.events.emit(StrategyAssigned {
                asset,
                strategy: kind,
                timestamp: self.clock.now(),
            });
            info!("Strategy for {} set to {}", asset, kind);
        }
        Ok(())
    }

    /// Swap in a new adapter of the same kind.
    ///
    /// Refused with `TokenHasBalance` while the old adapter still holds
    /// funds for any asset it supports.
    pub fn update_strategy_adapter(&self, caller: &Address, adapter: Arc<dyn StrategyAdapter>) -> Result<()> {
        self.authority.ensure_owner(caller)?;
        adapter.address().ensure_non_zero("adapter")?;

        let kind = adapter.kind();
        let old = self.adapter(kind);
        if old.address() == adapter.address() {
            return Ok(());
        }
        for asset in old.supported_tokens() {
            let balance = old.balance_of(&asset)?;
            if balance > 0 {
                return Err(VaultError::TokenHasBalance { asset, balance });
            }
        }

        let slot = match kind {
            StrategyKind::Aave => &self.aave,
            StrategyKind::Compound => &self.compound,
        };
        *slot.write().unwrap_or_else(|e| e.into_inner()) = adapter;
        info!("{} adapter replaced", kind);
        Ok(())
    }

    pub fn set_operator(&self, caller: &Address, operator: Address, enabled: bool) -> Result<()> {
        self.authority.set_operator(caller, operator, enabled)
    }

    // ========================================
    // ROUTING QUERIES
    // ========================================

    /// Preferred adapter for `asset`. Unassigned assets prefer Aave.
    pub fn get_strategy_for_token(&self, asset: &Address) -> StrategyKind {
        self.assignments
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(asset)
            .copied()
            .unwrap_or_default()
    }

    /// Adapter not paused, asset supported, market live. No side effects.
    pub fn is_strategy_available(&self, kind: StrategyKind, asset: &Address) -> bool {
        self.adapter(kind).is_available(asset)
    }

    fn ensure_vault(&self, caller: &Address) -> Result<()> {
        match self.vault() {
            Some(vault) if vault == *caller => Ok(()),
            _ => Err(VaultError::OnlyVault { caller: *caller }),
        }
    }

    fn ensure_vault_or_operator(&self, caller: &Address) -> Result<()> {
        if self.vault() == Some(*caller) || self.authority.is_operator(caller) {
            return Ok(());
        }
        Err(VaultError::OnlyVaultOrOperator { caller: *caller })
    }

    // ========================================
    // FUND MOVEMENT
    // ========================================

    /// Place `amount` of `asset` with the preferred adapter, or the
    /// alternate if the preferred one is unavailable. Returns the kind
    /// that received the funds.
    pub fn deposit(&self, caller: &Address, asset: &Address, amount: u128) -> Result<StrategyKind> {
        // ===== STEP 1: Validate =====
        self.ensure_vault(caller)?;
        if amount == 0 {
            return Err(VaultError::InvalidAmount);
        }

        let lock = self.locks.for_asset(asset);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        // ===== STEP 2: Choose candidates =====
        let preferred = self.get_strategy_for_token(asset);
        let candidates: Vec<StrategyKind> = [preferred, preferred.alternate()]
            .into_iter()
            .filter(|kind| self.is_strategy_available(*kind, asset))
            .collect();

        if candidates.is_empty() {
            let supported_anywhere = StrategyKind::ALL
                .iter()
                .any(|kind| self.adapter(*kind).is_supported(asset));
            return Err(if supported_anywhere {
                VaultError::NoStrategyAvailable { asset: *asset }
            } else {
                VaultError::UnsupportedToken { asset: *asset }
            });
        }

        // ===== STEP 3: Pull funds from the vault =====
        self.custody.transfer(asset, caller, &self.address, amount)?;

        // ===== STEP 4: Place funds, one alternate attempt at most =====
        let mut last_error = VaultError::NoStrategyAvailable { asset: *asset };
        for kind in candidates {
            match self.adapter(kind).deposit(&self.address, asset, amount) {
                Ok(()) => {
                    if kind != preferred {
                        warn!("Deposit of {} {} failed over from {} to {}", amount, asset, preferred, kind);
                        self.events.emit(StrategyFailover {
                            asset: *asset,
                            preferred,
                            used: kind,
                            amount,
                            timestamp: self.clock.now(),
                        });
                    }
                    return Ok(kind);
                }
                Err(e) if e.is_backend_failure() => {
                    warn!("{} rejected deposit of {}: {}", kind, asset, e);
                    last_error = e;
                }
                Err(e) => {
                    last_error = e;
                    break;
                }
            }
        }

        // ===== STEP 5: Nothing placed, return the funds =====
        if let Err(refund) = self.custody.transfer(asset, &self.address, caller, amount) {
            error!("Coordinator could not return {} of {} to {}: {}", amount, asset, caller, refund);
        }
        Err(last_error)
    }

    /// Redeem exactly `amount` of `asset` for the vault, from the
    /// preferred adapter first and the alternate for any remainder.
    ///
    /// ## Errors
    /// * `InsufficientLiquidity` - combined liquidity below `amount`, or a
    ///   market paid out less than it advertised (already rolled back)
    pub fn withdraw(&self, caller: &Address, asset: &Address, amount: u128) -> Result<u128> {
        // ===== STEP 1: Validate =====
        self.ensure_vault(caller)?;
        if amount == 0 {
            return Err(VaultError::InvalidAmount);
        }

        let lock = self.locks.for_asset(asset);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        // ===== STEP 2: Check combined liquidity before touching anything =====
        let liquidity = self.get_available_liquidity(asset);
        if liquidity.total < amount {
            return Err(VaultError::InsufficientLiquidity {
                asset: *asset,
                requested: amount,
                available: liquidity.total,
            });
        }

        // ===== STEP 3: Redeem, preferred first =====
        let preferred = self.get_strategy_for_token(asset);
        let mut legs: Vec<(StrategyKind, u128)> = Vec::with_capacity(2);
        let mut remaining = amount;

        for kind in [preferred, preferred.alternate()] {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(liquidity.from_kind(kind));
            if take == 0 {
                continue;
            }
            match self.adapter(kind).withdraw(&self.address, asset, take) {
                Ok(redeemed) => {
                    remaining -= redeemed;
                    if redeemed > 0 {
                        legs.push((kind, redeemed));
                    }
                }
                Err(e) => warn!("{} failed to redeem {} of {}: {}", kind, take, asset, e),
            }
        }

        // ===== STEP 4: Short? Put everything back and fail =====
        if remaining > 0 {
            let obtained = amount - remaining;
            warn!(
                "Withdrawal of {} {} obtained only {}; rolling back",
                amount, asset, obtained
            );
            self.restore_legs(asset, &legs);
            return Err(VaultError::InsufficientLiquidity {
                asset: *asset,
                requested: amount,
                available: obtained,
            });
        }

        // ===== STEP 5: Hand the funds to the vault =====
        self.custody.transfer(asset, &self.address, caller, amount)?;

        if let Some((used, drawn)) = legs.iter().find(|(kind, _)| *kind != preferred) {
            self.events.emit(StrategyFailover {
                asset: *asset,
                preferred,
                used: *used,
                amount: *drawn,
                timestamp: self.clock.now(),
            });
        }
        info!("Coordinator withdrew {} of {} over {} leg(s)", amount, asset, legs.len());
        Ok(amount)
    }

    /// Return redeemed legs to the adapters they came from, falling back
    /// to the other adapter if the original refuses.
    fn restore_legs(&self, asset: &Address, legs: &[(StrategyKind, u128)]) {
        for (kind, amount) in legs {
            let restored = self
                .adapter(*kind)
                .deposit(&self.address, asset, *amount)
                .or_else(|_| self.adapter(kind.alternate()).deposit(&self.address, asset, *amount));
            if let Err(e) = restored {
                error!(
                    "Could not restore {} of {} after failed withdrawal; funds held by coordinator {}: {}",
                    amount, asset, self.address, e
                );
            }
        }
    }

    /// Withdraw directly from the named adapter, skipping routing and
    /// failover. Returns what the adapter actually redeemed.
    pub fn emergency_withdraw_from_strategy(
        &self,
        caller: &Address,
        asset: &Address,
        amount: u128,
        kind: StrategyKind,
    ) -> Result<u128> {
        self.ensure_vault_or_operator(caller)?;
        if amount == 0 {
            return Err(VaultError::InvalidAmount);
        }

        let lock = self.locks.for_asset(asset);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let redeemed = self.adapter(kind).emergency_withdraw(&self.address, asset, amount)?;
        self.custody.transfer(asset, &self.address, caller, redeemed)?;

        self.events.emit(EmergencyWithdrawal {
            asset: *asset,
            strategy: kind,
            amount: redeemed,
            recipient: *caller,
            timestamp: self.clock.now(),
        });
        warn!("Emergency withdrawal of {} {} from {} to {}", redeemed, asset, kind, caller);
        Ok(redeemed)
    }

    /// Drain `asset` from every adapter holding it.
    ///
    /// Returns the total redeemed. Fails only if nothing could be
    /// redeemed and at least one adapter errored.
    pub fn emergency_withdraw(&self, caller: &Address, asset: &Address) -> Result<u128> {
        self.ensure_vault_or_operator(caller)?;

        let lock = self.locks.for_asset(asset);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut total: u128 = 0;
        let mut failure = None;

        for kind in StrategyKind::ALL {
            let adapter = self.adapter(kind);
            let balance = match adapter.balance_of(asset) {
                Ok(0) => continue,
                Ok(balance) => balance,
                Err(e) => {
                    warn!("Emergency drain of {} skipped {}: {}", asset, kind, e);
                    failure = Some(e);
                    continue;
                }
            };

            match adapter.emergency_withdraw(&self.address, asset, balance) {
                Ok(redeemed) => {
                    total = total.checked_add(redeemed).ok_or(VaultError::Overflow)?;
                    self.events.emit(EmergencyWithdrawal {
                        asset: *asset,
                        strategy: kind,
                        amount: redeemed,
                        recipient: *caller,
                        timestamp: self.clock.now(),
                    });
                }
                Err(e) => {
                    warn!("Emergency drain of {} from {} failed: {}", asset, kind, e);
                    failure = Some(e);
                }
            }
        }

        if total == 0 {
            if let Some(e) = failure {
                return Err(e);
            }
            return Ok(0);
        }

        self.custody.transfer(asset, &self.address, caller, total)?;
        warn!("Emergency drain moved {} of {} to {}", total, asset, caller);
        Ok(total)
    }

    // ========================================
    // AGGREGATION (read-only)
    // ========================================

    /// Balance held by the preferred adapter for `asset`.
    pub fn get_strategy_balance(&self, asset: &Address) -> Result<u128> {
        self.adapter(self.get_strategy_for_token(asset)).balance_of(asset)
    }

    /// Balance across both adapters.
    pub fn get_total_token_balance(&self, asset: &Address) -> Result<u128> {
        let mut total: u128 = 0;
        for kind in StrategyKind::ALL {
            total = total
                .checked_add(self.adapter(kind).balance_of(asset)?)
                .ok_or(VaultError::Overflow)?;
        }
        Ok(total)
    }

    /// Redeemable liquidity split by adapter.
    pub fn get_available_liquidity(&self, asset: &Address) -> Liquidity {
        let from_aave = self.adapter(StrategyKind::Aave).available_liquidity(asset);
        let from_compound = self.adapter(StrategyKind::Compound).available_liquidity(asset);
        Liquidity {
            total: from_aave.saturating_add(from_compound),
            from_aave,
            from_compound,
        }
    }

    /// APY of the preferred adapter, 0 if it does not support `asset`.
    pub fn get_strategy_apy(&self, asset: &Address) -> u32 {
        self.adapter(self.get_strategy_for_token(asset)).current_apy(asset)
    }

    /// USD value (18 decimals) of everything placed for `assets`.
    ///
    /// Assets with no balance are skipped without consulting the oracle.
    pub fn get_total_usd_value(&self, price_feeds: &PriceFeedManager, assets: &[Address]) -> Result<u128> {
        self.sum_usd_value(price_feeds, assets, None)
    }

    /// Like [`get_total_usd_value`](Self::get_total_usd_value), but only
    /// `moving` must have a fresh price. Every other asset falls back to
    /// its last accepted price when its oracle is stale or unreadable.
    pub fn get_pool_usd_value(
        &self,
        price_feeds: &PriceFeedManager,
        assets: &[Address],
        moving: &Address,
    ) -> Result<u128> {
        self.sum_usd_value(price_feeds, assets, Some(moving))
    }

    fn sum_usd_value(
        &self,
        price_feeds: &PriceFeedManager,
        assets: &[Address],
        moving: Option<&Address>,
    ) -> Result<u128> {
        let mut total: u128 = 0;
        for asset in assets {
            let balance = self.get_total_token_balance(asset)?;
            if balance == 0 {
                continue;
            }
            let usd = match moving {
                Some(moving) if moving != asset => {
                    price_feeds.get_token_value_in_usd_or_last(asset, balance)?
                }
                _ => price_feeds.get_token_value_in_usd(asset, balance)?,
            };
            total = total.checked_add(usd).ok_or(VaultError::Overflow)?;
        }
        Ok(total)
    }

    /// Analytics rows for both adapters.
    pub fn get_all_token_analytics(&self) -> Vec<TokenAnalytics> {
        StrategyKind::ALL
            .iter()
            .flat_map(|kind| self.adapter(*kind).all_token_analytics())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::VaultEvent;
    use crate::market::{LendingMarket, MarketResult};
    use crate::sim::{AssetListing, ManualClock, SimDeployment, SimulatedMarket};
    use pretty_assertions::assert_eq;

    const ADMIN: u64 = 1;

    fn usdc_units(n: u128) -> u128 {
        n * 1_000_000
    }

    struct Fixture {
        sim: SimDeployment,
        admin: Address,
        vault: Address,
        usdc: Address,
    }

    fn fixture(strategy: StrategyKind) -> Fixture {
        let admin = Address::from_low_u64(ADMIN);
        let usdc = Address::from_low_u64(10);
        let sim = SimDeployment::new(admin, Arc::new(ManualClock::new(1_000))).unwrap();
        sim.list_asset(AssetListing {
            symbol: "USDC".to_string(),
            address: usdc,
            decimals: 6,
            price: 100_000_000,
            strategy,
            compound_rate_bps: 300,
        })
        .unwrap();
        let vault = sim.vault.address();
        Fixture {
            sim,
            admin,
            vault,
            usdc,
        }
    }

    impl Fixture {
        fn coordinator(&self) -> &StrategyCoordinator {
            &self.sim.coordinator
        }

        /// Put `amount` in the vault's wallet and route it through `kind`.
        fn place(&self, kind: StrategyKind, amount: u128) {
            self.coordinator()
                .set_strategy_for_token(&self.admin, self.usdc, kind)
                .unwrap();
            self.sim.custody.mint(&self.usdc, &self.vault, amount).unwrap();
            assert_eq!(self.coordinator().deposit(&self.vault, &self.usdc, amount), Ok(kind));
        }

        fn balances(&self) -> (u128, u128) {
            (
                self.sim.aave.balance_of(&self.usdc).unwrap(),
                self.sim.compound.balance_of(&self.usdc).unwrap(),
            )
        }

        fn count(&self, name: &str) -> usize {
            self.sim
                .events
                .recent(usize::MAX)
                .iter()
                .filter(|e| e.name() == name)
                .count()
        }
    }

    /// Advertises its full cash but pays out half of every redemption.
    struct HalfPayMarket {
        inner: Arc<SimulatedMarket>,
    }

    impl LendingMarket for HalfPayMarket {
        fn address(&self) -> Address {
            Address::from_low_u64(0xDEAD)
        }
        fn base_asset(&self) -> Option<Address> {
            self.inner.base_asset()
        }
        fn supply(&self, account: &Address, asset: &Address, amount: u128) -> MarketResult<()> {
            self.inner.supply(account, asset, amount)
        }
        fn redeem(&self, account: &Address, asset: &Address, amount: u128) -> MarketResult<u128> {
            self.inner.redeem(account, asset, amount.div_ceil(2))
        }
        fn balance_of(&self, account: &Address, asset: &Address) -> MarketResult<u128> {
            self.inner.balance_of(account, asset)
        }
        fn available_cash(&self, asset: &Address) -> MarketResult<u128> {
            self.inner.available_cash(asset)
        }
        fn supply_rate_bps(&self, asset: &Address) -> MarketResult<u32> {
            self.inner.supply_rate_bps(asset)
        }
        fn is_paused(&self) -> MarketResult<bool> {
            self.inner.is_paused()
        }
    }

    #[test]
    fn test_unassigned_asset_prefers_aave() {
        let f = fixture(StrategyKind::Aave);
        let other = Address::from_low_u64(77);
        assert_eq!(f.coordinator().get_strategy_for_token(&other), StrategyKind::Aave);
        assert_eq!(f.coordinator().get_strategy_apy(&f.usdc), 420);
    }

    #[test]
    fn test_deposit_routes_to_preferred() {
        let f = fixture(StrategyKind::Compound);
        f.place(StrategyKind::Compound, usdc_units(100));

        assert_eq!(f.balances(), (0, usdc_units(100)));
        assert_eq!(f.sim.custody.balance_of(&f.usdc, &f.vault), 0);
        assert_eq!(f.count("StrategyFailover"), 0);
    }

    #[test]
    fn test_deposit_fails_over_when_preferred_paused() {
        let f = fixture(StrategyKind::Aave);
        f.sim.aave_pool.set_paused(true);
        f.sim.custody.mint(&f.usdc, &f.vault, usdc_units(100)).unwrap();

        let used = f.coordinator().deposit(&f.vault, &f.usdc, usdc_units(100)).unwrap();

        assert_eq!(used, StrategyKind::Compound);
        assert_eq!(f.balances(), (0, usdc_units(100)));
        let failover = f
            .sim
            .events
            .recent(usize::MAX)
            .into_iter()
            .find_map(|e| match e {
                VaultEvent::StrategyFailover(ev) => Some(ev),
                _ => None,
            })
            .unwrap();
        assert_eq!(failover.preferred, StrategyKind::Aave);
        assert_eq!(failover.used, StrategyKind::Compound);
    }

    #[test]
    fn test_deposit_with_both_down_refunds_vault() {
        let f = fixture(StrategyKind::Aave);
        f.sim.aave_pool.set_paused(true);
        f.sim
            .market(StrategyKind::Compound, &f.usdc)
            .unwrap()
            .set_reachable(false);
        f.sim.custody.mint(&f.usdc, &f.vault, 500).unwrap();

        assert_eq!(
            f.coordinator().deposit(&f.vault, &f.usdc, 500),
            Err(VaultError::NoStrategyAvailable { asset: f.usdc })
        );
        assert_eq!(f.sim.custody.balance_of(&f.usdc, &f.vault), 500);

        let unknown = Address::from_low_u64(99);
        assert_eq!(
            f.coordinator().deposit(&f.vault, &unknown, 1),
            Err(VaultError::UnsupportedToken { asset: unknown })
        );
    }

    #[test]
    fn test_fund_movement_is_vault_only() {
        let f = fixture(StrategyKind::Aave);
        assert_eq!(
            f.coordinator().deposit(&f.admin, &f.usdc, 1),
            Err(VaultError::OnlyVault { caller: f.admin })
        );
        assert_eq!(
            f.coordinator().withdraw(&f.admin, &f.usdc, 1),
            Err(VaultError::OnlyVault { caller: f.admin })
        );
        assert_eq!(
            f.coordinator().deposit(&f.vault, &f.usdc, 0),
            Err(VaultError::InvalidAmount)
        );
    }

    #[test]
    fn test_withdraw_splits_preferred_first() {
        let f = fixture(StrategyKind::Aave);
        f.place(StrategyKind::Aave, usdc_units(60));
        f.place(StrategyKind::Compound, usdc_units(40));
        f.coordinator()
            .set_strategy_for_token(&f.admin, f.usdc, StrategyKind::Aave)
            .unwrap();

        let liquidity = f.coordinator().get_available_liquidity(&f.usdc);
        assert_eq!(
            liquidity,
            Liquidity {
                total: usdc_units(100),
                from_aave: usdc_units(60),
                from_compound: usdc_units(40),
            }
        );

        let out = f.coordinator().withdraw(&f.vault, &f.usdc, usdc_units(80)).unwrap();

        assert_eq!(out, usdc_units(80));
        assert_eq!(f.sim.custody.balance_of(&f.usdc, &f.vault), usdc_units(80));
        assert_eq!(f.balances(), (0, usdc_units(20)));
        assert_eq!(f.count("StrategyFailover"), 1);
    }

    #[test]
    fn test_withdraw_short_liquidity_changes_nothing() {
        let f = fixture(StrategyKind::Aave);
        f.place(StrategyKind::Aave, usdc_units(60));
        f.place(StrategyKind::Compound, usdc_units(40));

        assert_eq!(
            f.coordinator().withdraw(&f.vault, &f.usdc, usdc_units(101)),
            Err(VaultError::InsufficientLiquidity {
                asset: f.usdc,
                requested: usdc_units(101),
                available: usdc_units(100),
            })
        );
        assert_eq!(f.balances(), (usdc_units(60), usdc_units(40)));

        f.sim.aave_pool.set_paused(true);
        assert_eq!(
            f.coordinator().withdraw(&f.vault, &f.usdc, usdc_units(50)),
            Err(VaultError::InsufficientLiquidity {
                asset: f.usdc,
                requested: usdc_units(50),
                available: usdc_units(40),
            })
        );
        assert_eq!(f.sim.custody.balance_of(&f.usdc, &f.vault), 0);
    }

    #[test]
    fn test_paused_adapter_is_skipped_by_withdrawals() {
        let f = fixture(StrategyKind::Aave);
        f.place(StrategyKind::Aave, usdc_units(60));
        f.place(StrategyKind::Compound, usdc_units(40));
        f.coordinator()
            .set_strategy_for_token(&f.admin, f.usdc, StrategyKind::Aave)
            .unwrap();
        f.sim.aave.set_paused(&f.admin, true).unwrap();

        assert_eq!(f.coordinator().get_available_liquidity(&f.usdc).from_aave, 0);

        let out = f.coordinator().withdraw(&f.vault, &f.usdc, usdc_units(30)).unwrap();
        assert_eq!(out, usdc_units(30));
        assert_eq!(f.balances(), (usdc_units(60), usdc_units(10)));
        assert_eq!(f.count("StrategyFailover"), 1);

        assert_eq!(
            f.coordinator().withdraw(&f.vault, &f.usdc, usdc_units(40)),
            Err(VaultError::InsufficientLiquidity {
                asset: f.usdc,
                requested: usdc_units(40),
                available: usdc_units(10),
            })
        );
        assert_eq!(f.balances(), (usdc_units(60), usdc_units(10)));

        let drained = f
            .coordinator()
            .emergency_withdraw_from_strategy(&f.admin, &f.usdc, usdc_units(60), StrategyKind::Aave)
            .unwrap();
        assert_eq!(drained, usdc_units(60));
        assert_eq!(f.balances(), (0, usdc_units(10)));
    }

    #[test]
    fn test_short_payout_is_rolled_back() {
        let f = fixture(StrategyKind::Aave);
        let inner = f.sim.market(StrategyKind::Compound, &f.usdc).unwrap();
        f.sim
            .compound
            .set_market(&f.admin, f.usdc, Arc::new(HalfPayMarket { inner }))
            .unwrap();
        f.place(StrategyKind::Aave, usdc_units(60));
        f.place(StrategyKind::Compound, usdc_units(40));
        f.coordinator()
            .set_strategy_for_token(&f.admin, f.usdc, StrategyKind::Aave)
            .unwrap();

        assert_eq!(
            f.coordinator().withdraw(&f.vault, &f.usdc, usdc_units(100)),
            Err(VaultError::InsufficientLiquidity {
                asset: f.usdc,
                requested: usdc_units(100),
                available: usdc_units(80),
            })
        );
        assert_eq!(f.balances(), (usdc_units(60), usdc_units(40)));
        assert_eq!(f.sim.custody.balance_of(&f.usdc, &f.vault), 0);
        assert_eq!(f.sim.custody.balance_of(&f.usdc, &f.coordinator().address()), 0);
    }

    #[test]
    fn test_emergency_withdraw_drains_both_adapters() {
        let f = fixture(StrategyKind::Aave);
        f.place(StrategyKind::Aave, usdc_units(60));
        f.place(StrategyKind::Compound, usdc_units(40));
        f.sim.aave.set_paused(&f.admin, true).unwrap();

        let outsider = Address::from_low_u64(500);
        assert_eq!(
            f.coordinator().emergency_withdraw(&outsider, &f.usdc),
            Err(VaultError::OnlyVaultOrOperator { caller: outsider })
        );

        let drained = f.coordinator().emergency_withdraw(&f.admin, &f.usdc).unwrap();

        assert_eq!(drained, usdc_units(100));
        assert_eq!(f.sim.custody.balance_of(&f.usdc, &f.admin), usdc_units(100));
        assert_eq!(f.balances(), (0, 0));
        assert_eq!(f.count("EmergencyWithdrawal"), 2);
        assert_eq!(f.coordinator().emergency_withdraw(&f.admin, &f.usdc), Ok(0));
    }

    #[test]
    fn test_emergency_withdraw_from_named_strategy() {
        let f = fixture(StrategyKind::Aave);
        f.place(StrategyKind::Aave, usdc_units(60));
        f.place(StrategyKind::Compound, usdc_units(40));

        let operator = Address::from_low_u64(7);
        f.coordinator().set_operator(&f.admin, operator, true).unwrap();

        let out = f
            .coordinator()
            .emergency_withdraw_from_strategy(&operator, &f.usdc, usdc_units(30), StrategyKind::Compound)
            .unwrap();

        assert_eq!(out, usdc_units(30));
        assert_eq!(f.sim.custody.balance_of(&f.usdc, &operator), usdc_units(30));
        assert_eq!(f.balances(), (usdc_units(60), usdc_units(10)));
    }

    #[test]
    fn test_aggregation_queries() {
        let f = fixture(StrategyKind::Aave);
        f.place(StrategyKind::Aave, usdc_units(60));
        f.place(StrategyKind::Compound, usdc_units(40));

        assert_eq!(
            f.coordinator().get_total_token_balance(&f.usdc),
            Ok(usdc_units(100))
        );
        assert_eq!(
            f.coordinator().get_strategy_balance(&f.usdc),
            Ok(usdc_units(40))
        );
        assert_eq!(
            f.coordinator()
                .get_total_usd_value(&f.sim.price_feeds, &[f.usdc, Address::from_low_u64(99)]),
            Ok(100 * crate::math::WAD)
        );
        assert_eq!(f.coordinator().get_all_token_analytics().len(), 2);
    }

    #[test]
    fn test_configuration_is_idempotent() {
        let f = fixture(StrategyKind::Aave);
        let assigned = f.count("StrategyAssigned");

        f.coordinator()
            .set_strategy_for_token(&f.admin, f.usdc, StrategyKind::Aave)
            .unwrap();
        f.coordinator().update_vault_address(&f.admin, f.vault).unwrap();

        assert_eq!(f.count("StrategyAssigned"), assigned);
        assert_eq!(f.count("VaultAddressUpdated"), 1);
        assert_eq!(
            f.coordinator()
                .set_strategy_for_token(&Address::from_low_u64(2), f.usdc, StrategyKind::Compound),
            Err(VaultError::NotOwner {
                caller: Address::from_low_u64(2)
            })
        );
    }

    #[test]
    fn test_adapter_swap_refused_while_funded() {
        let f = fixture(StrategyKind::Aave);
        f.place(StrategyKind::Aave, usdc_units(5));

        let replacement = Arc::new(crate::strategy::AaveStrategy::new(
            Address::from_low_u64(0xBEEF),
            f.admin,
            f.sim.custody.clone(),
            f.sim.clock.clone(),
            f.sim.events.clone(),
        ));
        assert_eq!(
            f.coordinator().update_strategy_adapter(&f.admin, replacement),
            Err(VaultError::TokenHasBalance {
                asset: f.usdc,
                balance: usdc_units(5)
            })
        );
    }
}
