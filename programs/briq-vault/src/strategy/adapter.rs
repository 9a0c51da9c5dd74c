//! # Lending Adapter
//!
//! Shared mechanics behind both adapter kinds.
//!
//! ## What Happens During a Deposit:
//!
//! ```text
//! BEFORE:                              AFTER:
//!
//! Coordinator                          Coordinator
//! └── USDC: 100                        └── USDC: 0 (-100)
//!
//! Adapter position (USDC)              Adapter position (USDC)
//! ├── current_balance: 500             ├── current_balance: 600 (+100)
//! ├── total_deposited: 500             ├── total_deposited: 600 (+100)
//! └── total_withdrawn: 0               └── total_withdrawn: 0
//!
//! Market                               Market
//! └── USDC cash: 500                   └── USDC cash: 600 (+100)
//! ```
//!
//! If the market rejects the supply, the pulled funds are returned to the
//! coordinator before the error propagates. A redemption whose funds cannot
//! be forwarded is re-supplied; if that fails too the position is set to
//! what the market still holds.
//!
//! A paused adapter reports no liquidity and refuses routed withdrawals.
//! Only `emergency_withdraw` can move funds out of it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::custody::TokenCustody;
use crate::errors::{Result, VaultError};
use crate::events::{CoordinatorUpdated, Deposited, EventLog, TokenSupportChanged, Withdrawn};
use crate::market::{LendingMarket, MarketFault};
use crate::state::{Address, Authority, StrategyKind, StrategyPosition, TokenAnalytics};

use super::StrategyAdapter;

/// Protocol-specific wiring: which market serves an asset.
pub trait MarketRouting: Send + Sync {
    const KIND: StrategyKind;

    fn market_for(&self, asset: &Address) -> Option<Arc<dyn LendingMarket>>;

    /// Extra checks before `asset` may be supported through `market`.
    fn validate(&self, asset: &Address, market: &dyn LendingMarket) -> Result<()>;

    /// Called when support for `asset` is removed.
    fn forget(&self, asset: &Address);
}

/// Strategy adapter over any [`MarketRouting`].
pub struct LendingAdapter<R: MarketRouting> {
    address: Address,
    authority: Authority,
    coordinator: RwLock<Option<Address>>,
    paused: AtomicBool,
    routing: R,
    positions: RwLock<HashMap<Address, StrategyPosition>>,
    custody: Arc<dyn TokenCustody>,
    clock: Arc<dyn Clock>,
    events: Arc<EventLog>,
}

impl<R: MarketRouting> LendingAdapter<R> {
    pub fn with_routing(
        address: Address,
        owner: Address,
        routing: R,
        custody: Arc<dyn TokenCustody>,
        clock: Arc<dyn Clock>,
        events: Arc<EventLog>,
    ) -> Self {
        Self {
            address,
            authority: Authority::new(owner),
            coordinator: RwLock::new(None),
            paused: AtomicBool::new(false),
            routing,
            positions: RwLock::new(HashMap::new()),
            custody,
            clock,
            events,
        }
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn routing(&self) -> &R {
        &self.routing
    }

    /// Snapshot of the stored position for `asset`.
    pub fn position(&self, asset: &Address) -> StrategyPosition {
        self.positions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(asset)
            .cloned()
            .unwrap_or_default()
    }

    fn ensure_coordinator(&self, caller: &Address) -> Result<()> {
        match self.coordinator() {
            Some(coordinator) if coordinator == *caller => Ok(()),
            _ => Err(VaultError::OnlyCoordinator { caller: *caller }),
        }
    }

    fn market(&self, asset: &Address) -> Result<Arc<dyn LendingMarket>> {
        self.routing
            .market_for(asset)
            .ok_or(VaultError::NoPoolForToken {
                asset: *asset,
                strategy: R::KIND,
            })
    }

    fn market_live(market: &dyn LendingMarket) -> bool {
        matches!(market.is_paused(), Ok(false))
    }

    fn fault(&self, asset: &Address, fault: MarketFault) -> VaultError {
        match fault {
            MarketFault::Paused | MarketFault::Unreachable => VaultError::StrategyUnavailable {
                strategy: R::KIND,
                asset: *asset,
            },
            MarketFault::InsufficientCash {
                requested,
                available,
            } => VaultError::InsufficientLiquidity {
                asset: *asset,
                requested,
                available,
            },
            other => VaultError::MarketError {
                strategy: R::KIND,
                reason: other.to_string(),
            },
        }
    }

    fn update_position<F>(&self, asset: &Address, apply: F) -> Result<StrategyPosition>
    where
        F: FnOnce(&mut StrategyPosition) -> Option<()>,
    {
        let mut positions = self.positions.write().unwrap_or_else(|e| e.into_inner());
        let position = positions.entry(*asset).or_default();
        apply(position).ok_or(VaultError::Overflow)?;
        Ok(position.clone())
    }

    /// Redeem up to `amount` and forward it to the coordinator. Ignores the
    /// adapter's pause switch; callers decide whether that applies.
    fn redeem(&self, caller: &Address, asset: &Address, amount: u128) -> Result<u128> {
        // ===== STEP 1: Validate =====
        self.ensure_coordinator(caller)?;
        if amount == 0 {
            return Err(VaultError::InvalidAmount);
        }
        let market = self.market(asset)?;

        // ===== STEP 2: Clamp to the live position =====
        let current = market
            .balance_of(&self.address, asset)
            .map_err(|f| self.fault(asset, f))?;
        let request = amount.min(current);
        if request == 0 {
            return Ok(0);
        }

        // ===== STEP 3: Redeem and forward to the coordinator =====
        let redeemed = market
            .redeem(&self.address, asset, request)
            .map_err(|f| self.fault(asset, f))?;
        if let Err(e) = self.custody.transfer(asset, &self.address, caller, redeemed) {
            self.settle_failed_forward(market.as_ref(), asset, current, redeemed);
            return Err(e);
        }

        // ===== STEP 4: Update position =====
        let live = market
            .balance_of(&self.address, asset)
            .unwrap_or_else(|_| current.saturating_sub(redeemed));
        let position = self.update_position(asset, |p| p.record_withdrawal(redeemed, live))?;

        self.events.emit(Withdrawn {
            strategy: R::KIND,
            asset: *asset,
            requested: amount,
            redeemed,
            total_withdrawn: position.total_withdrawn,
            timestamp: self.clock.now(),
        });
        if redeemed < amount {
            warn!(
                "{} adapter partially filled {} withdrawal: {} of {}",
                R::KIND, asset, redeemed, amount
            );
        } else {
            info!("{} adapter withdrew {} of {}", R::KIND, redeemed, asset);
        }
        Ok(redeemed)
    }

    /// Redeemed funds could not reach the coordinator. Put them back in the
    /// market, or at least make the position match what the market holds.
    fn settle_failed_forward(&self, market: &dyn LendingMarket, asset: &Address, before: u128, redeemed: u128) {
        match market.supply(&self.address, asset, redeemed) {
            Ok(()) => warn!(
                "{} adapter re-supplied {} of {} after a failed transfer",
                R::KIND, redeemed, asset
            ),
            Err(fault) => {
                error!(
                    "{} adapter holds {} of {} it could neither forward nor re-supply: {}",
                    R::KIND, redeemed, asset, fault
                );
                let live = market
                    .balance_of(&self.address, asset)
                    .unwrap_or_else(|_| before.saturating_sub(redeemed));
                if self
                    .update_position(asset, |p| p.record_withdrawal(redeemed, live))
                    .is_err()
                {
                    error!("{} adapter position for {} overflowed", R::KIND, asset);
                }
            }
        }
    }
}

impl<R: MarketRouting> StrategyAdapter for LendingAdapter<R> {
    fn kind(&self) -> StrategyKind {
        R::KIND
    }

    fn address(&self) -> Address {
        self.address
    }

    // ========================================
    // CONFIGURATION
    // ========================================

    fn add_supported_token(&self, caller: &Address, asset: Address) -> Result<()> {
        self.authority.ensure_owner(caller)?;
        asset.ensure_non_zero("asset")?;

        if self.is_supported(&asset) {
            return Err(VaultError::TokenSupportUnchanged { asset });
        }
        let market = self.market(&asset)?;
        self.routing.validate(&asset, market.as_ref())?;

        self.update_position(&asset, |p| {
            p.supported = true;
            Some(())
        })?;

        self.events.emit(TokenSupportChanged {
            strategy: R::KIND,
            asset,
            supported: true,
            timestamp: self.clock.now(),
        });
        info!("{} adapter now supports {}", R::KIND, asset);
        Ok(())
    }

    fn remove_supported_token(&self, caller: &Address, asset: Address) -> Result<()> {
        self.authority.ensure_owner(caller)?;

        if !self.is_supported(&asset) {
            return Err(VaultError::TokenSupportUnchanged { asset });
        }
        let stored = self.position(&asset).current_balance;
        let live = self.balance_of(&asset).unwrap_or(stored);
        let balance = stored.max(live);
        if balance > 0 {
            return Err(VaultError::TokenHasBalance { asset, balance });
        }

        self.routing.forget(&asset);
        self.update_position(&asset, |p| {
            p.supported = false;
            Some(())
        })?;

        self.events.emit(TokenSupportChanged {
            strategy: R::KIND,
            asset,
            supported: false,
            timestamp: self.clock.now(),
        });
        info!("{} adapter dropped support for {}", R::KIND, asset);
        Ok(())
    }

    fn set_coordinator(&self, caller: &Address, coordinator: Address) -> Result<()> {
        self.authority.ensure_owner(caller)?;
        coordinator.ensure_non_zero("coordinator")?;

        let mut current = self.coordinator.write().unwrap_or_else(|e| e.into_inner());
        if *current == Some(coordinator) {
            return Ok(());
        }
        *current = Some(coordinator);
        drop(current);

        self.events.emit(CoordinatorUpdated {
            strategy: R::KIND,
            coordinator,
            timestamp: self.clock.now(),
        });
        Ok(())
    }

    fn set_paused(&self, caller: &Address, paused: bool) -> Result<()> {
        self.authority.ensure_owner(caller)?;
        let was = self.paused.swap(paused, Ordering::SeqCst);
        if was != paused {
            warn!("{} adapter paused = {}", R::KIND, paused);
        }
        Ok(())
    }

    // ========================================
    // FUND MOVEMENT
    // ========================================

    fn deposit(&self, caller: &Address, asset: &Address, amount: u128) -> Result<()> {
        // ===== STEP 1: Validate =====
        self.ensure_coordinator(caller)?;
        if amount == 0 {
            return Err(VaultError::InvalidAmount);
        }
        if !self.is_supported(asset) {
            return Err(VaultError::UnsupportedToken { asset: *asset });
        }
        if self.is_paused() {
            return Err(VaultError::StrategyUnavailable {
                strategy: R::KIND,
                asset: *asset,
            });
        }
        let market = self.market(asset)?;

        // ===== STEP 2: Pull funds from the coordinator =====
        self.custody.transfer(asset, caller, &self.address, amount)?;

        // ===== STEP 3: Supply to the market, refunding on failure =====
        if let Err(fault) = market.supply(&self.address, asset, amount) {
            if let Err(refund) = self.custody.transfer(asset, &self.address, caller, amount) {
                error!(
                    "{} adapter could not refund {} of {} after failed supply: {}",
                    R::KIND, amount, asset, refund
                );
            }
            return Err(self.fault(asset, fault));
        }

        // ===== STEP 4: Update position =====
        let stored = self.position(asset).current_balance;
        let live = market
            .balance_of(&self.address, asset)
            .unwrap_or_else(|_| stored.saturating_add(amount));
        let position = self.update_position(asset, |p| p.record_deposit(amount, live))?;

        self.events.emit(Deposited {
            strategy: R::KIND,
            asset: *asset,
            amount,
            total_deposited: position.total_deposited,
            timestamp: self.clock.now(),
        });
        info!(
            "{} adapter deposited {} of {} (balance {})",
            R::KIND, amount, asset, position.current_balance
        );
        Ok(())
    }

    fn withdraw(&self, caller: &Address, asset: &Address, amount: u128) -> Result<u128> {
        self.ensure_coordinator(caller)?;
        if self.is_paused() {
            return Err(VaultError::StrategyUnavailable {
                strategy: R::KIND,
                asset: *asset,
            });
        }
        self.redeem(caller, asset, amount)
    }

    fn emergency_withdraw(&self, caller: &Address, asset: &Address, amount: u128) -> Result<u128> {
        self.redeem(caller, asset, amount)
    }

    // ========================================
    // QUERIES
    // ========================================

    fn coordinator(&self) -> Option<Address> {
        *self.coordinator.read().unwrap_or_else(|e| e.into_inner())
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn is_supported(&self, asset: &Address) -> bool {
        self.positions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(asset)
            .map(|p| p.supported)
            .unwrap_or(false)
    }

    fn is_available(&self, asset: &Address) -> bool {
        if self.is_paused() || !self.is_supported(asset) {
            return false;
        }
        match self.routing.market_for(asset) {
            Some(market) => Self::market_live(market.as_ref()),
            None => false,
        }
    }

    fn balance_of(&self, asset: &Address) -> Result<u128> {
        let position = self.position(asset);
        let market = match self.routing.market_for(asset) {
            Some(market) => market,
            None => return Ok(position.current_balance),
        };
        match market.balance_of(&self.address, asset) {
            Ok(balance) => Ok(balance),
            Err(_) if position.current_balance == 0 && position.net_deposits() == 0 => Ok(0),
            Err(fault) => Err(self.fault(asset, fault)),
        }
    }

    fn available_liquidity(&self, asset: &Address) -> u128 {
        if self.is_paused() {
            return 0;
        }
        let market = match self.routing.market_for(asset) {
            Some(market) if Self::market_live(market.as_ref()) => market,
            _ => return 0,
        };
        let balance = market.balance_of(&self.address, asset).unwrap_or(0);
        let cash = market.available_cash(asset).unwrap_or(0);
        balance.min(cash)
    }

    fn current_apy(&self, asset: &Address) -> u32 {
        if !self.is_supported(asset) {
            return 0;
        }
        self.routing
            .market_for(asset)
            .and_then(|market| market.supply_rate_bps(asset).ok())
            .unwrap_or(0)
    }

    fn supported_tokens(&self) -> Vec<Address> {
        let positions = self.positions.read().unwrap_or_else(|e| e.into_inner());
        let mut tokens: Vec<Address> = positions
            .iter()
            .filter(|(_, p)| p.supported)
            .map(|(a, _)| *a)
            .collect();
        tokens.sort();
        tokens
    }

    fn token_analytics(&self, asset: &Address) -> TokenAnalytics {
        let mut position = self.position(asset);
        if let Ok(live) = self.balance_of(asset) {
            position.current_balance = live;
        }

        TokenAnalytics {
            strategy: R::KIND,
            asset: *asset,
            current_balance: position.current_balance,
            total_deposited: position.total_deposited,
            total_withdrawn: position.total_withdrawn,
            net_deposits: position.net_deposits(),
            accrued_rewards: position.accrued_rewards(),
            protocol_rewards: 0,
            current_apy_bps: self.current_apy(asset),
        }
    }

    fn all_token_analytics(&self) -> Vec<TokenAnalytics> {
        let mut assets: Vec<Address> = self
            .positions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect();
        assets.sort();
        assets.iter().map(|a| self.token_analytics(a)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::MarketResult;
    use crate::sim::{InMemoryCustody, ManualClock, SimulatedMarket};
    use crate::strategy::CompoundStrategy;
    use pretty_assertions::assert_eq;

    const ADMIN: u64 = 1;
    const COORDINATOR: u64 = 2;
    const USDC: u64 = 10;

    /// Custody that can be told to refuse transfers into one account.
    struct GatedCustody {
        inner: Arc<InMemoryCustody>,
        blocked: Address,
        closed: AtomicBool,
    }

    impl TokenCustody for GatedCustody {
        fn transfer(&self, asset: &Address, from: &Address, to: &Address, amount: u128) -> Result<()> {
            if *to == self.blocked && self.closed.load(Ordering::SeqCst) {
                return Err(VaultError::InsufficientTokenBalance {
                    asset: *asset,
                    holder: *from,
                    required: amount,
                    available: 0,
                });
            }
            self.inner.transfer(asset, from, to, amount)
        }

        fn balance_of(&self, asset: &Address, holder: &Address) -> u128 {
            self.inner.balance_of(asset, holder)
        }
    }

    /// Claims one unit more than it actually pays out.
    struct OverReportingMarket {
        inner: Arc<SimulatedMarket>,
    }

    impl LendingMarket for OverReportingMarket {
        fn address(&self) -> Address {
            self.inner.address()
        }
        fn base_asset(&self) -> Option<Address> {
            self.inner.base_asset()
        }
        fn supply(&self, account: &Address, asset: &Address, amount: u128) -> MarketResult<()> {
            self.inner.supply(account, asset, amount)
        }
        fn redeem(&self, account: &Address, asset: &Address, amount: u128) -> MarketResult<u128> {
            self.inner.redeem(account, asset, amount).map(|paid| paid + 1)
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

    struct Setup {
        adapter: CompoundStrategy,
        tokens: Arc<InMemoryCustody>,
        gate: Arc<GatedCustody>,
        market: Arc<SimulatedMarket>,
        admin: Address,
        coordinator: Address,
        usdc: Address,
    }

    /// Compound adapter with 100 USDC supplied through `wrap(market)`.
    fn setup(wrap: impl FnOnce(Arc<SimulatedMarket>) -> Arc<dyn LendingMarket>) -> Setup {
        let admin = Address::from_low_u64(ADMIN);
        let coordinator = Address::from_low_u64(COORDINATOR);
        let usdc = Address::from_low_u64(USDC);
        let tokens = Arc::new(InMemoryCustody::new());
        let gate = Arc::new(GatedCustody {
            inner: tokens.clone(),
            blocked: coordinator,
            closed: AtomicBool::new(false),
        });
        let market = Arc::new(SimulatedMarket::new(
            Address::from_low_u64(200),
            Some(usdc),
            tokens.clone(),
            300,
        ));
        let adapter = CompoundStrategy::new(
            Address::from_low_u64(60),
            admin,
            gate.clone(),
            Arc::new(ManualClock::new(0)),
            Arc::new(EventLog::default()),
        );
        adapter.set_coordinator(&admin, coordinator).unwrap();
        adapter.set_market(&admin, usdc, wrap(market.clone())).unwrap();
        adapter.add_supported_token(&admin, usdc).unwrap();
        tokens.mint(&usdc, &coordinator, 100).unwrap();
        adapter.deposit(&coordinator, &usdc, 100).unwrap();

        Setup {
            adapter,
            tokens,
            gate,
            market,
            admin,
            coordinator,
            usdc,
        }
    }

    fn plain(market: Arc<SimulatedMarket>) -> Arc<dyn LendingMarket> {
        market
    }

    #[test]
    fn test_paused_adapter_refuses_routed_withdrawal() {
        let s = setup(plain);
        s.adapter.set_paused(&s.admin, true).unwrap();

        assert_eq!(s.adapter.available_liquidity(&s.usdc), 0);
        assert!(!s.adapter.is_available(&s.usdc));
        assert_eq!(
            s.adapter.withdraw(&s.coordinator, &s.usdc, 40),
            Err(VaultError::StrategyUnavailable {
                strategy: StrategyKind::Compound,
                asset: s.usdc,
            })
        );
        assert_eq!(s.market.balance_of(&s.adapter.address(), &s.usdc), Ok(100));

        // The emergency path still reaches the funds.
        assert_eq!(s.adapter.emergency_withdraw(&s.coordinator, &s.usdc, 40), Ok(40));
        assert_eq!(s.tokens.balance_of(&s.usdc, &s.coordinator), 40);
        assert_eq!(s.adapter.position(&s.usdc).current_balance, 60);

        let outsider = Address::from_low_u64(500);
        assert_eq!(
            s.adapter.emergency_withdraw(&outsider, &s.usdc, 1),
            Err(VaultError::OnlyCoordinator { caller: outsider })
        );

        s.adapter.set_paused(&s.admin, false).unwrap();
        assert_eq!(s.adapter.available_liquidity(&s.usdc), 60);
    }

    #[test]
    fn test_failed_forward_resupplies_market() {
        let s = setup(plain);
        s.gate.closed.store(true, Ordering::SeqCst);

        assert!(s.adapter.withdraw(&s.coordinator, &s.usdc, 30).is_err());

        let position = s.adapter.position(&s.usdc);
        assert_eq!(s.market.balance_of(&s.adapter.address(), &s.usdc), Ok(100));
        assert_eq!(position.current_balance, 100);
        assert_eq!(position.total_withdrawn, 0);
        assert_eq!(s.tokens.balance_of(&s.usdc, &s.adapter.address()), 0);
        assert_eq!(s.tokens.balance_of(&s.usdc, &s.coordinator), 0);
    }

    #[test]
    fn test_failed_forward_records_what_market_holds() {
        let s = setup(|market| Arc::new(OverReportingMarket { inner: market }));

        // Redeems 30 but reports 31, so neither the forward nor the
        // re-supply can be covered.
        assert!(s.adapter.withdraw(&s.coordinator, &s.usdc, 30).is_err());

        let live = s.market.balance_of(&s.adapter.address(), &s.usdc).unwrap();
        assert_eq!(live, 70);
        assert_eq!(s.adapter.position(&s.usdc).current_balance, live);
        assert_eq!(s.tokens.balance_of(&s.usdc, &s.adapter.address()), 30);
    }
}
