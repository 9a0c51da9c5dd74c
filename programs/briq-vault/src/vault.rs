//! # Briq Vault
//!
//! The single entry point for users. Converts a deposit into USD, mints
//! shares at the current price-per-share, and hands the funds to the
//! coordinator. Withdrawals run the same path in reverse.
//!
//! ## Share Math
//!
//! ```text
//! first deposit:   shares = usd_value                       (1 share = $1)
//! later deposits:  shares = usd_value × total_supply / total_value
//! withdrawal:      usd    = shares × total_value / total_supply
//!                  amount = usd → token, rounded down
//! ```
//!
//! `total_value` is measured before the incoming deposit reaches any
//! adapter, so a deposit never dilutes or enriches existing holders.
//! Every deposit and withdrawal holds the vault-wide operation lock from
//! that measurement until its mint or burn, so no other operation sees
//! the value moved without the supply.
//!
//! Only the asset being moved needs a fresh price. Other assets in the
//! pool may be valued at their last accepted price.
//!
//! ## Rollback
//!
//! Each step that can fail after funds have moved is followed by an
//! explicit compensation:
//!
//! | Failure after | Compensation |
//! |---------------|--------------|
//! | pulling user funds | refund user |
//! | coordinator placed funds | withdraw from coordinator, refund user |
//! | coordinator redeemed funds | re-deposit through coordinator |

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::coordinator::StrategyCoordinator;
use crate::custody::TokenCustody;
use crate::errors::{Result, VaultError};
use crate::events::{
    EventLog, PriceFeedManagerUpdated, SupportedTokenChanged, UserDeposited, UserWithdrew,
    VaultPauseChanged,
};
use crate::locks::OperationLock;
use crate::math::{mul_div, rescale, Rounding, USD_DECIMALS, WAD};
use crate::price_feed::PriceFeedManager;
use crate::share_ledger::BriqShares;
use crate::state::{Address, Authority, StrategyKind};

/// How the very first deposit is priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SharePricing {
    /// First deposit mints its USD value. Fair across assets.
    #[default]
    UsdNormalized,
    /// Legacy: first deposit mints the token amount rescaled to 18
    /// decimals, ignoring price. Later deposits are USD-priced either way.
    TokenRescale,
}

impl std::str::FromStr for SharePricing {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "usd" | "usd-normalized" => Ok(SharePricing::UsdNormalized),
            "token-rescale" | "legacy" => Ok(SharePricing::TokenRescale),
            other => Err(format!("unknown share pricing mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositReceipt {
    pub user: Address,
    pub asset: Address,
    pub amount: u128,
    pub usd_value: u128,
    pub shares_minted: u128,
    pub strategy: StrategyKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawReceipt {
    pub user: Address,
    pub asset: Address,
    pub shares_burned: u128,
    pub usd_value: u128,
    pub amount_out: u128,
}

/// Pre-flight answer for a withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalAvailability {
    pub fully_available: bool,
    pub available_amount: u128,
    pub requested_amount: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPosition {
    pub user: Address,
    pub shares: u128,
    pub usd_value: u128,
}

/// # BriqVault
///
/// ## Operations Summary
///
/// | Operation | Who Can Call | Description |
/// |-----------|--------------|-------------|
/// | `deposit` | Any user | Asset in, shares out |
/// | `withdraw` | Share holder | Shares in, asset out |
/// | `check_withdrawal_availability` | Anyone | Dry run of `withdraw` |
/// | `add_supported_token` / `remove_supported_token` | Owner | Listing |
/// | `update_price_feed_manager` | Owner | Swap oracle manager |
/// | `set_paused` | Owner | Emergency stop for deposits and withdrawals |
pub struct BriqVault {
    address: Address,
    authority: Authority,
    shares: Arc<BriqShares>,
    price_feeds: RwLock<Arc<PriceFeedManager>>,
    coordinator: Arc<StrategyCoordinator>,
    custody: Arc<dyn TokenCustody>,
    clock: Arc<dyn Clock>,
    events: Arc<EventLog>,
    supported_tokens: RwLock<Vec<Address>>,
    operations: OperationLock,
    paused: AtomicBool,
    pricing: RwLock<SharePricing>,
}

impl BriqVault {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        address: Address,
        owner: Address,
        shares: Arc<BriqShares>,
        price_feeds: Arc<PriceFeedManager>,
        coordinator: Arc<StrategyCoordinator>,
        custody: Arc<dyn TokenCustody>,
        clock: Arc<dyn Clock>,
        events: Arc<EventLog>,
    ) -> Self {
        Self {
            address,
            authority: Authority::new(owner),
            shares,
            price_feeds: RwLock::new(price_feeds),
            coordinator,
            custody,
            clock,
            events,
            supported_tokens: RwLock::new(Vec::new()),
            operations: OperationLock::new(),
            paused: AtomicBool::new(false),
            pricing: RwLock::new(SharePricing::default()),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn shares(&self) -> &Arc<BriqShares> {
        &self.shares
    }

    pub fn coordinator(&self) -> &Arc<StrategyCoordinator> {
        &self.coordinator
    }

    pub fn price_feeds(&self) -> Arc<PriceFeedManager> {
        self.price_feeds
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn share_pricing(&self) -> SharePricing {
        *self.pricing.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get_supported_tokens(&self) -> Vec<Address> {
        self.supported_tokens
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_supported(&self, asset: &Address) -> bool {
        self.supported_tokens
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(asset)
    }

    // ========================================
    // ADMIN
    // ========================================

    /// List `asset` for deposits. Requires a registered price feed.
    pub fn add_supported_token(&self, caller: &Address, asset: Address) -> Result<()> {
        self.authority.ensure_owner(caller)?;
        asset.ensure_non_zero("asset")?;
        if !self.price_feeds().has_price_feed(&asset) {
            return Err(VaultError::PriceFeedNotFound { asset });
        }

        {
            let mut tokens = self.supported_tokens.write().unwrap_or_else(|e| e.into_inner());
            if tokens.contains(&asset) {
                return Err(VaultError::TokenSupportUnchanged { asset });
            }
            tokens.push(asset);
        }

        self.events.emit(SupportedTokenChanged {
            asset,
            supported: true,
            timestamp: self.clock.now(),
        });
        info!("Vault listed {}", asset);
        Ok(())
    }

    /// Delist `asset`. Refused while strategies still hold it.
    pub fn remove_supported_token(&self, caller: &Address, asset: Address) -> Result<()> {
        self.authority.ensure_owner(caller)?;
        if !self.is_supported(&asset) {
            return Err(VaultError::TokenSupportUnchanged { asset });
        }

        let balance = self.coordinator.get_total_token_balance(&asset)?;
        if balance > 0 {
            return Err(VaultError::TokenHasBalance { asset, balance });
        }

        self.supported_tokens
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|a| *a != asset);

        self.events.emit(SupportedTokenChanged {
            asset,
            supported: false,
            timestamp: self.clock.now(),
        });
        info!("Vault delisted {}", asset);
        Ok(())
    }

    /// Swap the price feed manager. Every listed asset must already have a
    /// feed in the new manager.
    pub fn update_price_feed_manager(&self, caller: &Address, manager: Arc<PriceFeedManager>) -> Result<()> {
        self.authority.ensure_owner(caller)?;
        manager.address().ensure_non_zero("price feed manager")?;

        if let Some(missing) = self
            .get_supported_tokens()
            .into_iter()
            .find(|asset| !manager.has_price_feed(asset))
        {
            return Err(VaultError::PriceFeedNotFound { asset: missing });
        }

        let address = manager.address();
        *self.price_feeds.write().unwrap_or_else(|e| e.into_inner()) = manager;

        self.events.emit(PriceFeedManagerUpdated {
            manager: address,
            timestamp: self.clock.now(),
        });
        info!("Vault price feed manager set to {}", address);
        Ok(())
    }

    pub fn set_paused(&self, caller: &Address, paused: bool) -> Result<()> {
        self.authority.ensure_owner(caller)?;
        if self.paused.swap(paused, Ordering::SeqCst) != paused {
            self.events.emit(VaultPauseChanged {
                paused,
                timestamp: self.clock.now(),
            });
            warn!("Vault paused = {}", paused);
        }
        Ok(())
    }

    pub fn set_share_pricing(&self, caller: &Address, pricing: SharePricing) -> Result<()> {
        self.authority.ensure_owner(caller)?;
        *self.pricing.write().unwrap_or_else(|e| e.into_inner()) = pricing;
        info!("Share pricing mode set to {:?}", pricing);
        Ok(())
    }

    // ========================================
    // USER OPERATIONS
    // ========================================

    /// Deposit `amount` of `asset` and mint shares to `user`.
    ///
    /// ## Errors
    /// * `VaultPaused` - vault is paused
    /// * `InvalidAmount` - zero amount, or worth less than one share unit
    /// * `UnsupportedToken` / `PriceFeedNotFound` - asset not usable
    /// * `StalePrice` - oracle too old
    /// * `InsufficientTokenBalance` - user cannot cover `amount`
    /// * `NoStrategyAvailable` - both adapters down
    pub fn deposit(&self, user: &Address, asset: &Address, amount: u128) -> Result<DepositReceipt> {
        // ===== STEP 1: Validate =====
        if self.is_paused() {
            return Err(VaultError::VaultPaused);
        }
        if amount == 0 {
            return Err(VaultError::InvalidAmount);
        }
        user.ensure_non_zero("user")?;
        if !self.is_supported(asset) {
            return Err(VaultError::UnsupportedToken { asset: *asset });
        }
        let price_feeds = self.price_feeds();
        if !price_feeds.has_price_feed(asset) {
            return Err(VaultError::PriceFeedNotFound { asset: *asset });
        }

        let _operation = self.operations.acquire()?;

        // ===== STEP 2: Value the deposit against the current pool =====
        let usd_value = price_feeds.get_token_value_in_usd(asset, amount)?;
        let shares_minted = self.shares_for_deposit(&price_feeds, asset, amount, usd_value)?;
        if shares_minted == 0 {
            return Err(VaultError::InvalidAmount);
        }
        debug!("{} of {} = {} usd18 → {} shares", amount, asset, usd_value, shares_minted);

        // ===== STEP 3: Pull funds from the user =====
        self.custody.transfer(asset, user, &self.address, amount)?;

        // ===== STEP 4: Route funds to a strategy =====
        let strategy = match self.coordinator.deposit(&self.address, asset, amount) {
            Ok(kind) => kind,
            Err(e) => {
                self.refund(asset, user, amount);
                return Err(e);
            }
        };

        // ===== STEP 5: Mint shares =====
        if let Err(e) = self.shares.mint(&self.address, user, shares_minted) {
            warn!("Mint failed after placing {} of {}; unwinding", amount, asset);
            match self.coordinator.withdraw(&self.address, asset, amount) {
                Ok(_) => self.refund(asset, user, amount),
                Err(unwind) => error!(
                    "Could not unwind deposit of {} {} for {}: {}",
                    amount, asset, user, unwind
                ),
            }
            return Err(e);
        }

        // ===== STEP 6: Emit event =====
        self.events.emit(UserDeposited {
            user: *user,
            asset: *asset,
            amount,
            shares_minted,
            usd_value,
            timestamp: self.clock.now(),
        });
        info!(
            "{} deposited {} of {} into {} for {} shares",
            user, amount, asset, strategy, shares_minted
        );

        Ok(DepositReceipt {
            user: *user,
            asset: *asset,
            amount,
            usd_value,
            shares_minted,
            strategy,
        })
    }

    /// Burn `shares_to_burn` from `user` and pay out their value in `asset`.
    ///
    /// Shares are burned only after the coordinator has delivered the
    /// funds. `min_amount_out` rejects the withdrawal if the payout would
    /// be smaller.
    pub fn withdraw(
        &self,
        user: &Address,
        asset: &Address,
        shares_to_burn: u128,
        min_amount_out: Option<u128>,
    ) -> Result<WithdrawReceipt> {
        // ===== STEP 1: Validate =====
        if self.is_paused() {
            return Err(VaultError::VaultPaused);
        }
        if shares_to_burn == 0 {
            return Err(VaultError::InvalidAmount);
        }
        let _operation = self.operations.acquire()?;
        let available = self.shares.balance_of(user);
        if shares_to_burn > available {
            return Err(VaultError::InvalidShares {
                requested: shares_to_burn,
                available,
            });
        }
        if !self.is_supported(asset) {
            return Err(VaultError::UnsupportedToken { asset: *asset });
        }
        let price_feeds = self.price_feeds();
        if !price_feeds.has_price_feed(asset) {
            return Err(VaultError::PriceFeedNotFound { asset: *asset });
        }

        // ===== STEP 2: Quote =====
        let (usd_value, quoted) = self.quote_withdrawal(&price_feeds, asset, shares_to_burn)?;
        if quoted == 0 {
            return Err(VaultError::InvalidAmount);
        }
        if let Some(minimum) = min_amount_out {
            if quoted < minimum {
                return Err(VaultError::SlippageExceeded {
                    asset: *asset,
                    received: quoted,
                    minimum,
                });
            }
        }

        // ===== STEP 3: Obtain funds from strategies =====
        let redeemed = self.coordinator.withdraw(&self.address, asset, quoted)?;

        if let Some(minimum) = min_amount_out {
            if redeemed < minimum {
                self.restore(asset, redeemed);
                return Err(VaultError::SlippageExceeded {
                    asset: *asset,
                    received: redeemed,
                    minimum,
                });
            }
        }

        // ===== STEP 4: Burn shares now that funds are in hand =====
        if let Err(e) = self.shares.burn(&self.address, user, shares_to_burn) {
            self.restore(asset, redeemed);
            return Err(e);
        }

        // ===== STEP 5: Pay the user =====
        self.custody.transfer(asset, &self.address, user, redeemed)?;

        self.events.emit(UserWithdrew {
            user: *user,
            asset: *asset,
            amount_out: redeemed,
            shares_burned: shares_to_burn,
            timestamp: self.clock.now(),
        });
        info!(
            "{} withdrew {} of {} for {} shares",
            user, redeemed, asset, shares_to_burn
        );

        Ok(WithdrawReceipt {
            user: *user,
            asset: *asset,
            shares_burned: shares_to_burn,
            usd_value,
            amount_out: redeemed,
        })
    }

    /// Mirror of `withdraw` without side effects.
    pub fn check_withdrawal_availability(
        &self,
        asset: &Address,
        shares_to_burn: u128,
    ) -> Result<WithdrawalAvailability> {
        if shares_to_burn == 0 {
            return Err(VaultError::InvalidAmount);
        }
        if !self.is_supported(asset) {
            return Err(VaultError::UnsupportedToken { asset: *asset });
        }
        let (_, requested_amount) = self.quote_withdrawal(&self.price_feeds(), asset, shares_to_burn)?;
        let liquidity = self.coordinator.get_available_liquidity(asset).total;

        Ok(WithdrawalAvailability {
            fully_available: liquidity >= requested_amount,
            available_amount: liquidity.min(requested_amount),
            requested_amount,
        })
    }

    // ========================================
    // VALUATION QUERIES
    // ========================================

    /// USD value (18 decimals) of everything the strategies hold.
    pub fn get_total_vault_value_in_usd(&self) -> Result<u128> {
        self.total_value(&self.price_feeds())
    }

    /// USD value of one share at 18 decimals. $1 before the first deposit.
    pub fn price_per_share(&self) -> Result<u128> {
        let supply = self.shares.total_supply();
        if supply == 0 {
            return Ok(WAD);
        }
        mul_div(self.get_total_vault_value_in_usd()?, WAD, supply, Rounding::Floor)
    }

    /// Shares a deposit would mint right now.
    pub fn preview_deposit(&self, asset: &Address, amount: u128) -> Result<u128> {
        let price_feeds = self.price_feeds();
        let usd_value = price_feeds.get_token_value_in_usd(asset, amount)?;
        self.shares_for_deposit(&price_feeds, asset, amount, usd_value)
    }

    pub fn get_user_position(&self, user: &Address) -> Result<UserPosition> {
        let shares = self.shares.balance_of(user);
        let supply = self.shares.total_supply();
        let usd_value = if shares == 0 || supply == 0 {
            0
        } else {
            mul_div(shares, self.get_total_vault_value_in_usd()?, supply, Rounding::Floor)?
        };
        Ok(UserPosition {
            user: *user,
            shares,
            usd_value,
        })
    }

    // ========================================
    // INTERNALS
    // ========================================

    fn total_value(&self, price_feeds: &PriceFeedManager) -> Result<u128> {
        self.coordinator
            .get_total_usd_value(price_feeds, &self.get_supported_tokens())
    }

    /// Pool value used to price a deposit or withdrawal of `moving`.
    fn pool_value(&self, price_feeds: &PriceFeedManager, moving: &Address) -> Result<u128> {
        self.coordinator
            .get_pool_usd_value(price_feeds, &self.get_supported_tokens(), moving)
    }

    fn shares_for_deposit(
        &self,
        price_feeds: &PriceFeedManager,
        asset: &Address,
        amount: u128,
        usd_value: u128,
    ) -> Result<u128> {
        let supply = self.shares.total_supply();
        if supply == 0 {
            return match self.share_pricing() {
                SharePricing::UsdNormalized => Ok(usd_value),
                SharePricing::TokenRescale => {
                    let decimals = price_feeds.get_token_decimals(asset)?;
                    rescale(amount, decimals, USD_DECIMALS)
                }
            };
        }

        let total_value = self.pool_value(price_feeds, asset)?;
        if total_value == 0 {
            return Err(VaultError::ZeroVaultValue {
                total_supply: supply,
            });
        }
        mul_div(usd_value, supply, total_value, Rounding::Floor)
    }

    /// `(usd_value, token_amount)` owed for burning `shares`.
    fn quote_withdrawal(
        &self,
        price_feeds: &PriceFeedManager,
        asset: &Address,
        shares: u128,
    ) -> Result<(u128, u128)> {
        let supply = self.shares.total_supply();
        if supply == 0 || shares > supply {
            return Err(VaultError::InvalidShares {
                requested: shares,
                available: supply,
            });
        }
        let total_value = self.pool_value(price_feeds, asset)?;
        let usd_value = mul_div(shares, total_value, supply, Rounding::Floor)?;
        let amount = price_feeds.convert_usd_to_token(asset, usd_value)?;
        Ok((usd_value, amount))
    }

    fn refund(&self, asset: &Address, user: &Address, amount: u128) {
        if let Err(e) = self.custody.transfer(asset, &self.address, user, amount) {
            error!("Could not refund {} of {} to {}: {}", amount, asset, user, e);
        }
    }

    /// Put redeemed funds back into the strategies.
    fn restore(&self, asset: &Address, amount: u128) {
        warn!("Restoring {} of {} to strategies", amount, asset);
        if let Err(e) = self.coordinator.deposit(&self.address, asset, amount) {
            error!(
                "Could not restore {} of {}; funds held by vault {}: {}",
                amount, asset, self.address, e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::StrategyAdapter;
    use crate::sim::{AssetListing, ManualClock, SimDeployment};
    use pretty_assertions::assert_eq;

    const USDC_UNIT: u128 = 1_000_000;
    const ETH_UNIT: u128 = WAD;

    struct Fixture {
        sim: SimDeployment,
        clock: Arc<ManualClock>,
        admin: Address,
        alice: Address,
        bob: Address,
        usdc: Address,
        weth: Address,
    }

    fn fixture() -> Fixture {
        let admin = Address::from_low_u64(1);
        let clock = Arc::new(ManualClock::new(10_000));
        let sim = SimDeployment::new(admin, clock.clone()).unwrap();
        let usdc = Address::from_low_u64(10);
        let weth = Address::from_low_u64(11);
        sim.list_asset(AssetListing {
            symbol: "USDC".to_string(),
            address: usdc,
            decimals: 6,
            price: 100_000_000,
            strategy: StrategyKind::Aave,
            compound_rate_bps: 300,
        })
        .unwrap();
        sim.list_asset(AssetListing {
            symbol: "WETH".to_string(),
            address: weth,
            decimals: 18,
            price: 2_000 * 100_000_000,
            strategy: StrategyKind::Compound,
            compound_rate_bps: 250,
        })
        .unwrap();

        let alice = Address::from_low_u64(100);
        let bob = Address::from_low_u64(101);
        sim.fund(&alice, &usdc, 1_000 * USDC_UNIT).unwrap();
        sim.fund(&alice, &weth, 10 * ETH_UNIT).unwrap();
        sim.fund(&bob, &usdc, 1_000 * USDC_UNIT).unwrap();

        Fixture {
            sim,
            clock,
            admin,
            alice,
            bob,
            usdc,
            weth,
        }
    }

    impl Fixture {
        fn vault(&self) -> &BriqVault {
            &self.sim.vault
        }
    }

    #[test]
    fn test_first_deposit_mints_usd_value() {
        let f = fixture();
        let receipt = f.vault().deposit(&f.alice, &f.usdc, 100 * USDC_UNIT).unwrap();

        assert_eq!(receipt.shares_minted, 100 * WAD);
        assert_eq!(receipt.usd_value, 100 * WAD);
        assert_eq!(receipt.strategy, StrategyKind::Aave);
        assert_eq!(f.sim.shares.balance_of(&f.alice), 100 * WAD);
        assert_eq!(f.vault().get_total_vault_value_in_usd(), Ok(100 * WAD));
        assert_eq!(f.vault().price_per_share(), Ok(WAD));
    }

    #[test]
    fn test_later_deposits_priced_against_pool() {
        let f = fixture();
        f.vault().deposit(&f.alice, &f.usdc, 100 * USDC_UNIT).unwrap();
        f.vault().deposit(&f.alice, &f.weth, ETH_UNIT / 10).unwrap();

        // $100 + $200 in the pool, bob's $150 buys a third of the new total.
        let receipt = f.vault().deposit(&f.bob, &f.usdc, 150 * USDC_UNIT).unwrap();
        assert_eq!(receipt.shares_minted, 150 * WAD);
        assert_eq!(f.sim.shares.total_supply(), 450 * WAD);
    }

    #[test]
    fn test_interest_raises_price_per_share() {
        let f = fixture();
        f.vault().deposit(&f.alice, &f.usdc, 100 * USDC_UNIT).unwrap();
        f.sim
            .aave_pool
            .accrue_interest(&f.sim.aave.address(), &f.usdc, 10 * USDC_UNIT)
            .unwrap();

        assert_eq!(f.vault().price_per_share(), Ok(WAD + WAD / 10));
        let receipt = f.vault().deposit(&f.bob, &f.usdc, 110 * USDC_UNIT).unwrap();
        assert_eq!(receipt.shares_minted, 100 * WAD);
    }

    #[test]
    fn test_deposit_validation() {
        let f = fixture();
        let dai = Address::from_low_u64(12);

        assert_eq!(
            f.vault().deposit(&f.alice, &f.usdc, 0),
            Err(VaultError::InvalidAmount)
        );
        assert_eq!(
            f.vault().deposit(&f.alice, &dai, 1),
            Err(VaultError::UnsupportedToken { asset: dai })
        );
        assert!(matches!(
            f.vault().deposit(&f.alice, &f.usdc, 5_000 * USDC_UNIT),
            Err(VaultError::InsufficientTokenBalance { .. })
        ));

        f.vault().set_paused(&f.admin, true).unwrap();
        assert_eq!(
            f.vault().deposit(&f.alice, &f.usdc, 1),
            Err(VaultError::VaultPaused)
        );
        assert_eq!(f.sim.shares.total_supply(), 0);
    }

    #[test]
    fn test_stale_price_blocks_deposit() {
        let f = fixture();
        f.clock.advance(3_601);

        assert!(matches!(
            f.vault().deposit(&f.alice, &f.usdc, USDC_UNIT),
            Err(VaultError::StalePrice { .. })
        ));

        f.sim.refresh_prices();
        assert!(f.vault().deposit(&f.alice, &f.usdc, USDC_UNIT).is_ok());
    }

    #[test]
    fn test_stale_price_only_blocks_its_own_asset() {
        let f = fixture();
        f.vault().deposit(&f.alice, &f.usdc, 100 * USDC_UNIT).unwrap();
        // $100 of WETH; records 2000 as its last accepted price
        f.vault().deposit(&f.alice, &f.weth, ETH_UNIT / 20).unwrap();

        f.clock.advance(3_601);
        f.sim.set_price(&f.usdc, 100_000_000).unwrap();

        // Other assets are valued at their last accepted price.
        let receipt = f.vault().deposit(&f.bob, &f.usdc, 100 * USDC_UNIT).unwrap();
        assert_eq!(receipt.shares_minted, 100 * WAD);
        let out = f.vault().withdraw(&f.bob, &f.usdc, 50 * WAD, None).unwrap();
        assert_eq!(out.amount_out, 50 * USDC_UNIT);

        assert!(matches!(
            f.vault().deposit(&f.alice, &f.weth, ETH_UNIT / 20),
            Err(VaultError::StalePrice { asset, .. }) if asset == f.weth
        ));
        assert!(matches!(
            f.vault().withdraw(&f.alice, &f.weth, WAD, None),
            Err(VaultError::StalePrice { asset, .. }) if asset == f.weth
        ));
        // The strict TVL query still refuses the stale feed.
        assert!(f.vault().get_total_vault_value_in_usd().is_err());
    }

    #[test]
    fn test_paused_adapter_holds_funds_until_emergency() {
        use crate::strategy::StrategyAdapter;

        let f = fixture();
        f.vault().deposit(&f.alice, &f.usdc, 100 * USDC_UNIT).unwrap();
        f.sim.aave.set_paused(&f.admin, true).unwrap();

        assert!(matches!(
            f.vault().withdraw(&f.alice, &f.usdc, 40 * WAD, None),
            Err(VaultError::InsufficientLiquidity { .. })
        ));
        assert_eq!(f.sim.aave.balance_of(&f.usdc), Ok(100 * USDC_UNIT));
        assert_eq!(f.sim.shares.balance_of(&f.alice), 100 * WAD);
        assert_eq!(f.sim.custody.balance_of(&f.usdc, &f.alice), 900 * USDC_UNIT);

        let drained = f.sim.coordinator.emergency_withdraw(&f.admin, &f.usdc).unwrap();
        assert_eq!(drained, 100 * USDC_UNIT);
        assert_eq!(f.sim.aave.balance_of(&f.usdc), Ok(0));
    }

    #[test]
    fn test_failed_placement_refunds_user() {
        let f = fixture();
        f.sim.aave_pool.set_paused(true);
        f.sim
            .market(StrategyKind::Compound, &f.usdc)
            .unwrap()
            .set_paused(true);

        assert_eq!(
            f.vault().deposit(&f.alice, &f.usdc, 10 * USDC_UNIT),
            Err(VaultError::NoStrategyAvailable { asset: f.usdc })
        );
        assert_eq!(
            f.sim.custody.balance_of(&f.usdc, &f.alice),
            1_000 * USDC_UNIT
        );
        assert_eq!(f.sim.shares.balance_of(&f.alice), 0);
    }

    #[test]
    fn test_withdraw_burns_and_pays_out() {
        let f = fixture();
        f.vault().deposit(&f.alice, &f.usdc, 100 * USDC_UNIT).unwrap();

        let receipt = f
            .vault()
            .withdraw(&f.alice, &f.usdc, 40 * WAD, Some(40 * USDC_UNIT))
            .unwrap();

        assert_eq!(receipt.amount_out, 40 * USDC_UNIT);
        assert_eq!(f.sim.shares.balance_of(&f.alice), 60 * WAD);
        assert_eq!(f.sim.custody.balance_of(&f.usdc, &f.alice), 940 * USDC_UNIT);
    }

    #[test]
    fn test_withdraw_in_other_asset() {
        let f = fixture();
        f.vault().deposit(&f.alice, &f.weth, ETH_UNIT).unwrap();
        f.vault().deposit(&f.bob, &f.usdc, 1_000 * USDC_UNIT).unwrap();

        // Bob's 1000 shares are worth $1000 = 0.5 WETH.
        let receipt = f.vault().withdraw(&f.bob, &f.weth, 1_000 * WAD, None).unwrap();
        assert_eq!(receipt.amount_out, ETH_UNIT / 2);
        assert_eq!(f.sim.shares.balance_of(&f.bob), 0);
    }

    #[test]
    fn test_withdraw_validation_leaves_shares() {
        let f = fixture();
        f.vault().deposit(&f.alice, &f.usdc, 100 * USDC_UNIT).unwrap();

        assert_eq!(
            f.vault().withdraw(&f.alice, &f.usdc, 0, None),
            Err(VaultError::InvalidAmount)
        );
        assert_eq!(
            f.vault().withdraw(&f.alice, &f.usdc, 101 * WAD, None),
            Err(VaultError::InvalidShares {
                requested: 101 * WAD,
                available: 100 * WAD
            })
        );
        assert_eq!(
            f.vault()
                .withdraw(&f.alice, &f.usdc, 50 * WAD, Some(51 * USDC_UNIT)),
            Err(VaultError::SlippageExceeded {
                asset: f.usdc,
                received: 50 * USDC_UNIT,
                minimum: 51 * USDC_UNIT
            })
        );

        f.sim.aave_pool.set_paused(true);
        assert!(matches!(
            f.vault().withdraw(&f.alice, &f.usdc, 50 * WAD, None),
            Err(VaultError::InsufficientLiquidity { .. })
        ));
        assert_eq!(f.sim.shares.balance_of(&f.alice), 100 * WAD);
        assert_eq!(f.vault().get_total_vault_value_in_usd(), Ok(100 * WAD));
    }

    #[test]
    fn test_withdrawal_availability() {
        let f = fixture();
        f.vault().deposit(&f.alice, &f.usdc, 100 * USDC_UNIT).unwrap();
        f.vault().deposit(&f.alice, &f.weth, ETH_UNIT / 20).unwrap();

        // $200 of shares against $100 of USDC liquidity.
        let check = f
            .vault()
            .check_withdrawal_availability(&f.usdc, 200 * WAD)
            .unwrap();
        assert_eq!(
            check,
            WithdrawalAvailability {
                fully_available: false,
                available_amount: 100 * USDC_UNIT,
                requested_amount: 200 * USDC_UNIT,
            }
        );

        let check = f
            .vault()
            .check_withdrawal_availability(&f.usdc, 50 * WAD)
            .unwrap();
        assert!(check.fully_available);
    }

    #[test]
    fn test_token_listing_rules() {
        let f = fixture();
        let dai = Address::from_low_u64(12);

        assert_eq!(
            f.vault().add_supported_token(&f.admin, dai),
            Err(VaultError::PriceFeedNotFound { asset: dai })
        );
        assert_eq!(
            f.vault().add_supported_token(&f.admin, f.usdc),
            Err(VaultError::TokenSupportUnchanged { asset: f.usdc })
        );
        assert_eq!(
            f.vault().add_supported_token(&f.alice, f.usdc),
            Err(VaultError::NotOwner { caller: f.alice })
        );

        f.vault().deposit(&f.alice, &f.usdc, USDC_UNIT).unwrap();
        assert_eq!(
            f.vault().remove_supported_token(&f.admin, f.usdc),
            Err(VaultError::TokenHasBalance {
                asset: f.usdc,
                balance: USDC_UNIT
            })
        );

        f.vault().remove_supported_token(&f.admin, f.weth).unwrap();
        assert_eq!(f.vault().get_supported_tokens(), vec![f.usdc]);
    }

    #[test]
    fn test_token_rescale_pricing_ignores_price_on_first_deposit() {
        let f = fixture();
        f.vault()
            .set_share_pricing(&f.admin, SharePricing::TokenRescale)
            .unwrap();

        let receipt = f.vault().deposit(&f.alice, &f.weth, ETH_UNIT).unwrap();
        assert_eq!(receipt.shares_minted, WAD);
        assert_eq!(receipt.usd_value, 2_000 * WAD);
        assert_eq!("legacy".parse::<SharePricing>(), Ok(SharePricing::TokenRescale));
    }

    #[test]
    fn test_price_feed_manager_swap_requires_full_coverage() {
        let f = fixture();
        let replacement = Arc::new(PriceFeedManager::new(
            Address::from_low_u64(0xB005),
            f.admin,
            f.sim.oracle.clone(),
            f.sim.clock.clone(),
            f.sim.events.clone(),
        ));
        replacement
            .set_price_feed(&f.admin, f.usdc, Address::from_low_u64(0xF000), 6)
            .unwrap();

        assert_eq!(
            f.vault()
                .update_price_feed_manager(&f.admin, replacement.clone()),
            Err(VaultError::PriceFeedNotFound { asset: f.weth })
        );

        replacement
            .set_price_feed(&f.admin, f.weth, Address::from_low_u64(0xF001), 18)
            .unwrap();
        f.vault()
            .update_price_feed_manager(&f.admin, replacement)
            .unwrap();
        assert_eq!(f.vault().price_feeds().address(), Address::from_low_u64(0xB005));
    }

    #[test]
    fn test_user_position() {
        let f = fixture();
        f.vault().deposit(&f.alice, &f.usdc, 300 * USDC_UNIT).unwrap();
        f.vault().deposit(&f.bob, &f.usdc, 100 * USDC_UNIT).unwrap();

        let position = f.vault().get_user_position(&f.bob).unwrap();
        assert_eq!(position.shares, 100 * WAD);
        assert_eq!(position.usd_value, 100 * WAD);
        assert_eq!(
            f.vault().get_user_position(&Address::from_low_u64(999)).unwrap().usd_value,
            0
        );
    }
}
