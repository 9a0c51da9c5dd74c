//! A fully wired engine on simulated collaborators.
//!
//! ```text
//!   InMemoryCustody ◀──────────────── every component moves tokens here
//!         │
//!   BriqVault ── BriqShares
//!         │ └─── PriceFeedManager ── StaticOracle
//!   StrategyCoordinator
//!     ├── AaveStrategy ───── SimulatedMarket (shared pool)
//!     └── CompoundStrategy ─ SimulatedMarket (one per listed asset)
//! ```

use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::info;

use crate::clock::Clock;
use crate::coordinator::StrategyCoordinator;
use crate::errors::{Result, VaultError};
use crate::events::EventLog;
use crate::price_feed::PriceFeedManager;
use crate::share_ledger::BriqShares;
use crate::state::{Address, StrategyKind};
use crate::strategy::{AaveStrategy, CompoundStrategy, StrategyAdapter};
use crate::vault::BriqVault;

use super::{InMemoryCustody, SimulatedMarket, StaticOracle};

pub const VAULT_ADDRESS: u64 = 0xB000;
pub const COORDINATOR_ADDRESS: u64 = 0xB001;
pub const AAVE_ADAPTER_ADDRESS: u64 = 0xB002;
pub const COMPOUND_ADAPTER_ADDRESS: u64 = 0xB003;
pub const PRICE_FEED_MANAGER_ADDRESS: u64 = 0xB004;
pub const AAVE_POOL_ADDRESS: u64 = 0xA000;

const FEED_ADDRESS_BASE: u64 = 0xF000;
const COMPOUND_MARKET_BASE: u64 = 0xC000;

/// Supply rate of the shared Aave pool, in basis points.
pub const AAVE_POOL_RATE_BPS: u32 = 420;

/// An asset to list on a [`SimDeployment`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetListing {
    pub symbol: String,
    pub address: Address,
    pub decimals: u8,
    /// USD price at 8 decimals.
    pub price: i128,
    pub strategy: StrategyKind,
    pub compound_rate_bps: u32,
}

/// A listed asset and the simulated collaborators created for it.
#[derive(Debug, Clone)]
pub struct ListedAsset {
    pub listing: AssetListing,
    pub feed: Address,
    pub compound_market: Arc<SimulatedMarket>,
}

pub struct SimDeployment {
    pub admin: Address,
    pub custody: Arc<InMemoryCustody>,
    pub oracle: Arc<StaticOracle>,
    pub clock: Arc<dyn Clock>,
    pub events: Arc<EventLog>,
    pub price_feeds: Arc<PriceFeedManager>,
    pub shares: Arc<BriqShares>,
    pub aave: Arc<AaveStrategy>,
    pub compound: Arc<CompoundStrategy>,
    pub aave_pool: Arc<SimulatedMarket>,
    pub coordinator: Arc<StrategyCoordinator>,
    pub vault: Arc<BriqVault>,
    listed: RwLock<Vec<ListedAsset>>,
}

impl SimDeployment {
    /// Deploy and wire every component, owned by `admin`.
    pub fn new(admin: Address, clock: Arc<dyn Clock>) -> Result<Self> {
        admin.ensure_non_zero("admin")?;

        let custody = Arc::new(InMemoryCustody::new());
        let oracle = Arc::new(StaticOracle::new());
        let events = Arc::new(EventLog::default());

        // ===== STEP 1: Deploy =====
        let price_feeds = Arc::new(PriceFeedManager::new(
            Address::from_low_u64(PRICE_FEED_MANAGER_ADDRESS),
            admin,
            oracle.clone(),
            clock.clone(),
            events.clone(),
        ));
        let shares = Arc::new(BriqShares::new(admin, clock.clone(), events.clone()));
        let aave_pool = Arc::new(SimulatedMarket::new(
            Address::from_low_u64(AAVE_POOL_ADDRESS),
            None,
            custody.clone(),
            AAVE_POOL_RATE_BPS,
        ));
        let aave = Arc::new(AaveStrategy::new(
            Address::from_low_u64(AAVE_ADAPTER_ADDRESS),
            admin,
            custody.clone(),
            clock.clone(),
            events.clone(),
        ));
        let compound = Arc::new(CompoundStrategy::new(
            Address::from_low_u64(COMPOUND_ADAPTER_ADDRESS),
            admin,
            custody.clone(),
            clock.clone(),
            events.clone(),
        ));
        let coordinator = Arc::new(StrategyCoordinator::new(
            Address::from_low_u64(COORDINATOR_ADDRESS),
            admin,
            aave.clone(),
            compound.clone(),
            custody.clone(),
            clock.clone(),
            events.clone(),
        ));
        let vault = Arc::new(BriqVault::new(
            Address::from_low_u64(VAULT_ADDRESS),
            admin,
            shares.clone(),
            price_feeds.clone(),
            coordinator.clone(),
            custody.clone(),
            clock.clone(),
            events.clone(),
        ));

        // ===== STEP 2: Wire authorities =====
        aave.set_pool(&admin, aave_pool.clone())?;
        aave.set_coordinator(&admin, coordinator.address())?;
        compound.set_coordinator(&admin, coordinator.address())?;
        coordinator.update_vault_address(&admin, vault.address())?;
        shares.set_vault(&admin, vault.address())?;

        info!("Deployed vault {} owned by {}", vault.address(), admin);

        Ok(Self {
            admin,
            custody,
            oracle,
            clock,
            events,
            price_feeds,
            shares,
            aave,
            compound,
            aave_pool,
            coordinator,
            vault,
            listed: RwLock::new(Vec::new()),
        })
    }

    /// Register a feed, a Compound market and adapter support for a new
    /// asset, assign its strategy and list it on the vault.
    pub fn list_asset(&self, listing: AssetListing) -> Result<ListedAsset> {
        let asset = listing.address;
        asset.ensure_non_zero("asset")?;
        if self.listed_asset(&asset).is_some() {
            return Err(VaultError::TokenSupportUnchanged { asset });
        }

        let index = self.listed.read().unwrap_or_else(|e| e.into_inner()).len() as u64;
        let feed = Address::from_low_u64(FEED_ADDRESS_BASE + index);
        let compound_market = Arc::new(SimulatedMarket::new(
            Address::from_low_u64(COMPOUND_MARKET_BASE + index),
            Some(asset),
            self.custody.clone(),
            listing.compound_rate_bps,
        ));

        self.oracle
            .set_price(feed, listing.price, 8, self.clock.now());
        self.price_feeds
            .set_price_feed(&self.admin, asset, feed, listing.decimals)?;

        self.aave.add_supported_token(&self.admin, asset)?;
        self.compound
            .set_market(&self.admin, asset, compound_market.clone())?;
        self.compound.add_supported_token(&self.admin, asset)?;

        self.coordinator
            .set_strategy_for_token(&self.admin, asset, listing.strategy)?;
        self.vault.add_supported_token(&self.admin, asset)?;

        let listed = ListedAsset {
            listing,
            feed,
            compound_market,
        };
        self.listed
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listed.clone());
        info!(
            "Listed {} ({}) via {}",
            listed.listing.symbol, asset, listed.listing.strategy
        );
        Ok(listed)
    }

    pub fn listed_assets(&self) -> Vec<ListedAsset> {
        self.listed.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn listed_asset(&self, asset: &Address) -> Option<ListedAsset> {
        self.listed
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|l| l.listing.address == *asset)
            .cloned()
    }

    pub fn asset_by_symbol(&self, symbol: &str) -> Option<ListedAsset> {
        self.listed
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|l| l.listing.symbol.eq_ignore_ascii_case(symbol))
            .cloned()
    }

    /// The simulated market behind `kind` for `asset`.
    pub fn market(&self, kind: StrategyKind, asset: &Address) -> Option<Arc<SimulatedMarket>> {
        match kind {
            StrategyKind::Aave => Some(self.aave_pool.clone()),
            StrategyKind::Compound => self.listed_asset(asset).map(|l| l.compound_market),
        }
    }

    /// Post a new 8-decimal price for `asset`, stamped now.
    pub fn set_price(&self, asset: &Address, price: i128) -> Result<()> {
        let listed = self
            .listed_asset(asset)
            .ok_or(VaultError::PriceFeedNotFound { asset: *asset })?;
        self.oracle.set_price(listed.feed, price, 8, self.clock.now());
        Ok(())
    }

    /// Re-stamp every feed with the current time.
    pub fn refresh_prices(&self) {
        let now = self.clock.now();
        for listed in self.listed_assets() {
            self.oracle.touch(&listed.feed, now);
        }
    }

    /// Mint test tokens to `user`.
    pub fn fund(&self, user: &Address, asset: &Address, amount: u128) -> Result<()> {
        if self.listed_asset(asset).is_none() {
            return Err(VaultError::UnsupportedToken { asset: *asset });
        }
        self.custody.mint(asset, user, amount)
    }
}
