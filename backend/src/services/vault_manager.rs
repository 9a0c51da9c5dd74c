//! # Vault Manager Service
//!
//! The VaultManager is the central service for vault operations. It owns
//! the running engine and translates API requests (string amounts,
//! symbols, hex addresses) into engine calls.
//!
//! ## Responsibilities
//!
//! - Deploy the engine and list the configured seed assets
//! - Process deposit and withdrawal requests
//! - Answer position, TVL and strategy queries
//! - Forward admin configuration to the owning component
//! - Drive the simulated markets and oracles for development
//!
//! ## Flow Example: Deposit
//!
//! ```text
//! 1. User requests deposit via API ("100.5" USDC)
//!                ↓
//! 2. VaultManager resolves the symbol and parses base units
//!                ↓
//! 3. BriqVault prices the deposit and mints shares
//!                ↓
//! 4. StrategyCoordinator places funds (with failover)
//!                ↓
//! 5. Receipt formatted and returned to user
//! ```

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use briq_vault::clock::{Clock, SystemClock};
use briq_vault::custody::TokenCustody;
use briq_vault::sim::{AssetListing, ListedAsset, SimDeployment, SimulatedMarket};
use briq_vault::{Address, StrategyKind, VaultError, VaultEvent};
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::models::{
    AnalyticsResponse, AssetTvl, AvailabilityResponse, DepositRequest, DepositResponse,
    EmergencyWithdrawRequest, FaucetRequest, FaucetResponse, HealthResponse, LiquidityResponse,
    MarketAction, MarketControlRequest, OperationResponse, PauseRequest, PositionResponse,
    SetPriceFeedRequest, SetStrategyRequest, StrategyHealth, StrategyInfoResponse, TokenResponse,
    TvlResponse, WithdrawRequest, WithdrawResponse, WithdrawalAvailabilityQuery,
};
use crate::utils::{format_units, format_usd, parse_units, ratio_bps};

const SHARE_DECIMALS: u8 = 18;

/// Supply rate of each seed asset's Compound market.
const DEFAULT_COMPOUND_RATE_BPS: u32 = 350;

/// Seed assets get addresses `0x..1001`, `0x..1002`, ...
const SEED_ASSET_ADDRESS_BASE: u64 = 0x1000;

/// Largest faucet mint, in whole tokens.
const FAUCET_LIMIT: &str = "1000000";

/// Errors that can occur in vault operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Rejected by the engine.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Symbol or address is not listed.
    #[error("Unknown asset: {0}")]
    UnknownAsset(String),

    /// Development controls are restricted to the admin.
    #[error("Caller {0} is not the admin")]
    Unauthorized(Address),
}

impl ManagerError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ManagerError::Vault(e) => e.code(),
            ManagerError::InvalidInput(_) => "INVALID_INPUT",
            ManagerError::UnknownAsset(_) => "UNKNOWN_ASSET",
            ManagerError::Unauthorized(_) => "UNAUTHORIZED",
        }
    }
}

/// The main service for vault operations.
///
/// ## Usage
///
/// ```rust,ignore
/// let manager = VaultManager::bootstrap(config)?;
///
/// let receipt = manager.deposit(DepositRequest {
///     user: "0x00000000000000000000000000000000000003e9".into(),
///     asset: "USDC".into(),
///     amount: "100".into(),
/// })?;
/// ```
#[derive(Clone)]
pub struct VaultManager {
    /// The running engine.
    sim: Arc<SimDeployment>,

    /// Application configuration.
    config: AppConfig,

    /// Assets whose oracle heartbeat is suspended.
    frozen_prices: Arc<RwLock<HashSet<Address>>>,
}

impl VaultManager {
    pub fn new(sim: Arc<SimDeployment>, config: AppConfig) -> Self {
        Self {
            sim,
            config,
            frozen_prices: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Deploy the engine on the wall clock and list the seed assets.
    pub fn bootstrap(config: AppConfig) -> Result<Self, ManagerError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Deploy the engine on `clock` and list the seed assets.
    ///
    /// ## Errors
    ///
    /// Fails on a duplicate seed symbol or any engine configuration error.
    pub fn with_clock(config: AppConfig, clock: Arc<dyn Clock>) -> Result<Self, ManagerError> {
        let admin = config.admin_address;
        let sim = SimDeployment::new(admin, clock)?;

        sim.price_feeds
            .set_staleness_window(&admin, config.price_staleness_seconds)?;
        sim.vault.set_share_pricing(&admin, config.share_pricing)?;

        for (index, seed) in config.seed_assets.iter().enumerate() {
            if sim.asset_by_symbol(&seed.symbol).is_some() {
                return Err(ManagerError::InvalidInput(format!(
                    "duplicate seed asset {}",
                    seed.symbol
                )));
            }
            let price = i128::try_from(seed.price).map_err(|_| {
                ManagerError::InvalidInput(format!("price of {} is out of range", seed.symbol))
            })?;

            let listed = sim.list_asset(AssetListing {
                symbol: seed.symbol.clone(),
                address: Address::from_low_u64(SEED_ASSET_ADDRESS_BASE + index as u64 + 1),
                decimals: seed.decimals,
                price,
                strategy: seed.strategy,
                compound_rate_bps: DEFAULT_COMPOUND_RATE_BPS,
            })?;
            info!(
                "   {} at {} ({} decimals, ${}, {})",
                listed.listing.symbol,
                listed.listing.address,
                seed.decimals,
                format_units(seed.price, 8, 2),
                seed.strategy
            );
        }

        Ok(Self::new(Arc::new(sim), config))
    }

    pub fn deployment(&self) -> &Arc<SimDeployment> {
        &self.sim
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    // ==========================================
    // LOOKUPS
    // ==========================================

    /// Find a listed asset by symbol (case-insensitive) or address.
    pub fn resolve_asset(&self, asset: &str) -> Result<ListedAsset, ManagerError> {
        let asset = asset.trim();
        let found = if asset.starts_with("0x") || asset.starts_with("0X") {
            self.sim.listed_asset(&parse_address(asset)?)
        } else {
            self.sim.asset_by_symbol(asset)
        };
        found.ok_or_else(|| ManagerError::UnknownAsset(asset.to_string()))
    }

    /// Listed assets the vault currently supports.
    pub fn supported_assets(&self) -> Vec<ListedAsset> {
        self.sim
            .vault
            .get_supported_tokens()
            .iter()
            .filter_map(|asset| self.sim.listed_asset(asset))
            .collect()
    }

    fn ensure_admin(&self, caller: &Address) -> Result<(), ManagerError> {
        if *caller != self.config.admin_address {
            return Err(ManagerError::Unauthorized(*caller));
        }
        Ok(())
    }

    // ==========================================
    // USER OPERATIONS
    // ==========================================

    /// Deposit a supported token and mint shares.
    ///
    /// ## Errors
    ///
    /// * `InvalidInput` - malformed address or amount
    /// * `UnknownAsset` - symbol not listed
    /// * `Vault(..)` - any engine rejection (stale price, no strategy, ...)
    pub fn deposit(&self, request: DepositRequest) -> Result<DepositResponse, ManagerError> {
        let user = parse_address(&request.user)?;
        let listed = self.resolve_asset(&request.asset)?;
        let amount = parse_amount(&request.amount, listed.listing.decimals)?;

        let receipt = self.sim.vault.deposit(&user, &listed.listing.address, amount)?;
        info!(
            "Deposit of {} by {} placed with {}",
            display_amount(receipt.amount, &listed),
            user,
            receipt.strategy
        );

        Ok(DepositResponse {
            user: user.to_string(),
            asset: receipt.asset.to_string(),
            symbol: listed.listing.symbol.clone(),
            amount: receipt.amount.to_string(),
            formatted_amount: display_amount(receipt.amount, &listed),
            usd_value: receipt.usd_value.to_string(),
            formatted_usd: format_usd(receipt.usd_value),
            shares_minted: receipt.shares_minted.to_string(),
            strategy: receipt.strategy.to_string(),
        })
    }

    /// Burn shares and pay out the chosen token.
    pub fn withdraw(&self, request: WithdrawRequest) -> Result<WithdrawResponse, ManagerError> {
        let user = parse_address(&request.user)?;
        let listed = self.resolve_asset(&request.asset)?;
        let shares = parse_amount(&request.shares, SHARE_DECIMALS)?;
        let min_amount_out = request
            .min_amount_out
            .as_deref()
            .map(|minimum| parse_amount(minimum, listed.listing.decimals))
            .transpose()?;

        let receipt = self
            .sim
            .vault
            .withdraw(&user, &listed.listing.address, shares, min_amount_out)?;
        info!(
            "Withdrawal of {} BRIQ by {} paid {}",
            format_units(receipt.shares_burned, SHARE_DECIMALS, 4),
            user,
            display_amount(receipt.amount_out, &listed)
        );

        Ok(WithdrawResponse {
            user: user.to_string(),
            asset: receipt.asset.to_string(),
            symbol: listed.listing.symbol.clone(),
            shares_burned: receipt.shares_burned.to_string(),
            usd_value: receipt.usd_value.to_string(),
            formatted_usd: format_usd(receipt.usd_value),
            amount_out: receipt.amount_out.to_string(),
            formatted_amount: display_amount(receipt.amount_out, &listed),
        })
    }

    /// Dry run of a withdrawal.
    pub fn withdrawal_availability(
        &self,
        query: WithdrawalAvailabilityQuery,
    ) -> Result<AvailabilityResponse, ManagerError> {
        let listed = self.resolve_asset(&query.asset)?;
        let shares = parse_amount(&query.shares, SHARE_DECIMALS)?;
        let availability = self
            .sim
            .vault
            .check_withdrawal_availability(&listed.listing.address, shares)?;

        Ok(AvailabilityResponse {
            asset: listed.listing.address.to_string(),
            symbol: listed.listing.symbol,
            fully_available: availability.fully_available,
            available_amount: availability.available_amount.to_string(),
            requested_amount: availability.requested_amount.to_string(),
        })
    }

    /// Mint simulated tokens to a user.
    ///
    /// **DEVELOPMENT ONLY**
    pub fn faucet(&self, request: FaucetRequest) -> Result<FaucetResponse, ManagerError> {
        let user = parse_address(&request.user)?;
        let listed = self.resolve_asset(&request.asset)?;
        let decimals = listed.listing.decimals;
        let amount = parse_amount(&request.amount, decimals)?;
        if amount == 0 || amount > parse_amount(FAUCET_LIMIT, decimals)? {
            return Err(ManagerError::InvalidInput(format!(
                "faucet amount must be between 0 and {} {}",
                FAUCET_LIMIT, listed.listing.symbol
            )));
        }

        let asset = listed.listing.address;
        self.sim.fund(&user, &asset, amount)?;
        let balance = self.sim.custody.balance_of(&asset, &user);
        debug!("Faucet minted {} to {}", display_amount(amount, &listed), user);

        Ok(FaucetResponse {
            user: user.to_string(),
            asset: asset.to_string(),
            minted: amount.to_string(),
            balance: balance.to_string(),
            formatted_balance: display_amount(balance, &listed),
        })
    }

    // ==========================================
    // QUERIES
    // ==========================================

    pub fn position(&self, user: &str) -> Result<PositionResponse, ManagerError> {
        let user = parse_address(user)?;
        let position = self.sim.vault.get_user_position(&user)?;
        let supply = self.sim.shares.total_supply();

        Ok(PositionResponse {
            user: user.to_string(),
            shares: position.shares.to_string(),
            formatted_shares: format_units(position.shares, SHARE_DECIMALS, 4),
            usd_value: position.usd_value.to_string(),
            formatted_usd: format_usd(position.usd_value),
            ownership_bps: ratio_bps(position.shares, supply),
        })
    }

    /// Total Value Locked with a per-asset breakdown.
    pub fn tvl(&self) -> Result<TvlResponse, ManagerError> {
        let total = self.sim.vault.get_total_vault_value_in_usd()?;
        let price_per_share = self.sim.vault.price_per_share()?;
        let price_feeds = self.sim.vault.price_feeds();

        let mut assets = Vec::new();
        for listed in self.supported_assets() {
            let asset = listed.listing.address;
            let balance = self.sim.coordinator.get_total_token_balance(&asset)?;
            assets.push(AssetTvl {
                asset: asset.to_string(),
                symbol: listed.listing.symbol.clone(),
                balance: balance.to_string(),
                formatted_balance: display_amount(balance, &listed),
                usd_value: price_feeds
                    .get_token_value_in_usd(&asset, balance)
                    .ok()
                    .map(|usd| usd.to_string()),
            });
        }

        Ok(TvlResponse {
            total_value_usd: total.to_string(),
            formatted_tvl: format_usd(total),
            total_shares: self.sim.shares.total_supply().to_string(),
            price_per_share: price_per_share.to_string(),
            assets,
            timestamp: Utc::now(),
        })
    }

    pub fn tokens(&self) -> Vec<TokenResponse> {
        let price_feeds = self.sim.vault.price_feeds();
        self.supported_assets()
            .into_iter()
            .map(|listed| {
                let asset = listed.listing.address;
                TokenResponse {
                    symbol: listed.listing.symbol.clone(),
                    address: asset.to_string(),
                    decimals: listed.listing.decimals,
                    feed: listed.feed.to_string(),
                    price_usd: price_feeds
                        .get_token_price(&asset)
                        .ok()
                        .map(|price| format_units(price, 8, 2)),
                    strategy: self.sim.coordinator.get_strategy_for_token(&asset).to_string(),
                }
            })
            .collect()
    }

    /// Balance, APY, liquidity and availability of both adapters for one asset.
    pub fn strategy_info(&self, asset: &str) -> Result<StrategyInfoResponse, ManagerError> {
        let listed = self.resolve_asset(asset)?;
        let asset = listed.listing.address;
        let coordinator = &self.sim.coordinator;
        let liquidity = coordinator.get_available_liquidity(&asset);
        let total = coordinator.get_total_token_balance(&asset)?;

        Ok(StrategyInfoResponse {
            asset: asset.to_string(),
            symbol: listed.listing.symbol.clone(),
            assigned_strategy: coordinator.get_strategy_for_token(&asset).to_string(),
            strategy_balance: coordinator.get_strategy_balance(&asset)?.to_string(),
            total_balance: total.to_string(),
            formatted_total: display_amount(total, &listed),
            apy_bps: coordinator.get_strategy_apy(&asset),
            liquidity: LiquidityResponse {
                total: liquidity.total.to_string(),
                from_aave: liquidity.from_aave.to_string(),
                from_compound: liquidity.from_compound.to_string(),
            },
            aave_available: coordinator.is_strategy_available(StrategyKind::Aave, &asset),
            compound_available: coordinator.is_strategy_available(StrategyKind::Compound, &asset),
        })
    }

    pub fn analytics(&self) -> Vec<AnalyticsResponse> {
        self.sim
            .coordinator
            .get_all_token_analytics()
            .into_iter()
            .map(|row| AnalyticsResponse {
                strategy: row.strategy.to_string(),
                asset: row.asset.to_string(),
                symbol: self.sim.listed_asset(&row.asset).map(|l| l.listing.symbol),
                current_balance: row.current_balance.to_string(),
                total_deposited: row.total_deposited.to_string(),
                total_withdrawn: row.total_withdrawn.to_string(),
                net_deposits: row.net_deposits.to_string(),
                accrued_rewards: row.accrued_rewards.to_string(),
                protocol_rewards: row.protocol_rewards.to_string(),
                current_apy_bps: row.current_apy_bps,
            })
            .collect()
    }

    pub fn recent_events(&self, limit: usize) -> Vec<VaultEvent> {
        self.sim.events.recent(limit)
    }

    /// Availability and APY of both adapters for every supported asset.
    pub fn strategy_health(&self) -> Vec<StrategyHealth> {
        let mut rows = Vec::new();
        for listed in self.supported_assets() {
            let asset = listed.listing.address;
            for kind in StrategyKind::ALL {
                rows.push(StrategyHealth {
                    strategy: kind.to_string(),
                    symbol: listed.listing.symbol.clone(),
                    available: self.sim.coordinator.is_strategy_available(kind, &asset),
                    apy_bps: self.sim.coordinator.adapter(kind).current_apy(&asset),
                });
            }
        }
        rows
    }

    /// Supported assets whose price cannot be read, with the reason.
    pub fn unpriced_assets(&self) -> Vec<(ListedAsset, VaultError)> {
        let price_feeds = self.sim.vault.price_feeds();
        self.supported_assets()
            .into_iter()
            .filter_map(|listed| {
                price_feeds
                    .get_token_price(&listed.listing.address)
                    .err()
                    .map(|e| (listed, e))
            })
            .collect()
    }

    pub fn health(&self) -> HealthResponse {
        let strategies = self.strategy_health();
        let unpriced: Vec<String> = self
            .unpriced_assets()
            .into_iter()
            .map(|(listed, _)| listed.listing.symbol)
            .collect();
        let vault_paused = self.sim.vault.is_paused();

        let stranded = self.supported_assets().iter().any(|listed| {
            StrategyKind::ALL.iter().all(|kind| {
                !self
                    .sim
                    .coordinator
                    .is_strategy_available(*kind, &listed.listing.address)
            })
        });
        let degraded = vault_paused || !unpriced.is_empty() || strategies.iter().any(|s| !s.available);

        let status = if stranded {
            "unhealthy"
        } else if degraded {
            "degraded"
        } else {
            "healthy"
        };

        HealthResponse {
            status: status.to_string(),
            vault_paused,
            strategies,
            unpriced_assets: unpriced,
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Re-stamp every price feed that is not frozen. Returns how many
    /// feeds were refreshed.
    pub fn refresh_prices(&self) -> usize {
        let frozen = self.frozen_prices.read().unwrap_or_else(|e| e.into_inner());
        let now = self.sim.clock.now();
        let mut refreshed = 0;
        for listed in self.sim.listed_assets() {
            if frozen.contains(&listed.listing.address) {
                continue;
            }
            self.sim.oracle.touch(&listed.feed, now);
            refreshed += 1;
        }
        refreshed
    }

    // ==========================================
    // ADMIN OPERATIONS
    // ==========================================

    pub fn set_strategy(&self, request: SetStrategyRequest) -> Result<OperationResponse, ManagerError> {
        let caller = parse_address(&request.caller)?;
        let listed = self.resolve_asset(&request.asset)?;
        let kind = parse_strategy(&request.strategy)?;

        self.sim
            .coordinator
            .set_strategy_for_token(&caller, listed.listing.address, kind)?;

        Ok(OperationResponse {
            operation: "set-strategy".to_string(),
            message: format!("{} now prefers {}", listed.listing.symbol, kind),
            amount: None,
        })
    }

    /// Post a new price for an asset and re-register its feed.
    pub fn set_price_feed(&self, request: SetPriceFeedRequest) -> Result<OperationResponse, ManagerError> {
        let caller = parse_address(&request.caller)?;
        let listed = self.resolve_asset(&request.asset)?;
        let asset = listed.listing.address;

        // Ownership is checked before the oracle is touched.
        self.sim.price_feeds.authority().ensure_owner(&caller)?;

        let price = parse_amount(&request.price, 8)?;
        if price == 0 {
            return Err(ManagerError::InvalidInput("price must be positive".to_string()));
        }
        let price = i128::try_from(price)
            .map_err(|_| ManagerError::InvalidInput("price is out of range".to_string()))?;

        self.sim.set_price(&asset, price)?;
        self.sim
            .price_feeds
            .set_price_feed(&caller, asset, listed.feed, listed.listing.decimals)?;

        Ok(OperationResponse {
            operation: "set-price-feed".to_string(),
            message: format!("{} priced at ${}", listed.listing.symbol, request.price.trim()),
            amount: None,
        })
    }

    /// Drain an asset from every adapter, or take `amount` from one.
    pub fn emergency_withdraw(
        &self,
        request: EmergencyWithdrawRequest,
    ) -> Result<OperationResponse, ManagerError> {
        let caller = parse_address(&request.caller)?;
        let listed = self.resolve_asset(&request.asset)?;
        let asset = listed.listing.address;
        let coordinator = &self.sim.coordinator;

        let (amount, source) = match request.strategy.as_deref() {
            Some(strategy) => {
                let kind = parse_strategy(strategy)?;
                let amount = match request.amount.as_deref() {
                    Some(amount) => parse_amount(amount, listed.listing.decimals)?,
                    None => coordinator.adapter(kind).balance_of(&asset)?,
                };
                let redeemed = coordinator.emergency_withdraw_from_strategy(&caller, &asset, amount, kind)?;
                (redeemed, kind.to_string())
            }
            None => (
                coordinator.emergency_withdraw(&caller, &asset)?,
                "all strategies".to_string(),
            ),
        };
        warn!(
            "Emergency withdrawal of {} from {} to {}",
            display_amount(amount, &listed),
            source,
            caller
        );

        Ok(OperationResponse {
            operation: "emergency-withdraw".to_string(),
            message: format!("Withdrew {} from {}", display_amount(amount, &listed), source),
            amount: Some(amount.to_string()),
        })
    }

    pub fn set_paused(&self, request: PauseRequest) -> Result<OperationResponse, ManagerError> {
        let caller = parse_address(&request.caller)?;
        self.sim.vault.set_paused(&caller, request.paused)?;

        Ok(OperationResponse {
            operation: "pause".to_string(),
            message: if request.paused { "Vault paused" } else { "Vault resumed" }.to_string(),
            amount: None,
        })
    }

    /// Drive a simulated market, adapter kill switch or oracle.
    ///
    /// **DEVELOPMENT ONLY** - admin caller required.
    pub fn market_control(&self, request: MarketControlRequest) -> Result<OperationResponse, ManagerError> {
        let caller = parse_address(&request.caller)?;
        self.ensure_admin(&caller)?;
        let listed = self.resolve_asset(&request.asset)?;
        let asset = listed.listing.address;
        let symbol = listed.listing.symbol.clone();
        let amount = request
            .amount
            .as_deref()
            .map(|amount| parse_amount(amount, listed.listing.decimals))
            .transpose()?;

        let message = match request.action {
            MarketAction::OracleOffline | MarketAction::OracleOnline => {
                let offline = request.action == MarketAction::OracleOffline;
                self.sim.oracle.set_offline(listed.feed, offline);
                format!("{} price feed offline = {}", symbol, offline)
            }
            MarketAction::FreezePrice => {
                self.frozen_prices
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(asset);
                format!("{} price frozen", symbol)
            }
            MarketAction::UnfreezePrice => {
                self.frozen_prices
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&asset);
                self.sim.oracle.touch(&listed.feed, self.sim.clock.now());
                format!("{} price refreshed", symbol)
            }
            MarketAction::PauseAdapter | MarketAction::ResumeAdapter => {
                let kind = required_strategy(&request)?;
                let paused = request.action == MarketAction::PauseAdapter;
                self.sim.coordinator.adapter(kind).set_paused(&caller, paused)?;
                format!("{} adapter paused = {}", kind, paused)
            }
            MarketAction::Pause | MarketAction::Resume => {
                let (kind, market) = self.target_market(&request, &asset)?;
                let paused = request.action == MarketAction::Pause;
                market.set_paused(paused);
                format!("{} market for {} paused = {}", kind, symbol, paused)
            }
            MarketAction::Disconnect | MarketAction::Reconnect => {
                let (kind, market) = self.target_market(&request, &asset)?;
                let reachable = request.action == MarketAction::Reconnect;
                market.set_reachable(reachable);
                format!("{} market for {} reachable = {}", kind, symbol, reachable)
            }
            MarketAction::AccrueInterest => {
                let (kind, market) = self.target_market(&request, &asset)?;
                let interest = amount.ok_or_else(|| {
                    ManagerError::InvalidInput("accrue-interest requires an amount".to_string())
                })?;
                let account = self.sim.coordinator.adapter(kind).address();
                market
                    .accrue_interest(&account, &asset, interest)
                    .map_err(|fault| ManagerError::InvalidInput(fault.to_string()))?;
                format!("{} accrued {}", kind, display_amount(interest, &listed))
            }
            MarketAction::CashCap => {
                let (kind, market) = self.target_market(&request, &asset)?;
                market.set_cash_cap(asset, amount);
                match amount {
                    Some(cap) => format!("{} cash for {} capped at {}", kind, symbol, display_amount(cap, &listed)),
                    None => format!("{} cash cap for {} removed", kind, symbol),
                }
            }
        };

        info!("Market control: {}", message);
        Ok(OperationResponse {
            operation: "market-control".to_string(),
            message,
            amount: amount.map(|a| a.to_string()),
        })
    }

    fn target_market(
        &self,
        request: &MarketControlRequest,
        asset: &Address,
    ) -> Result<(StrategyKind, Arc<SimulatedMarket>), ManagerError> {
        let kind = required_strategy(request)?;
        let market = self
            .sim
            .market(kind, asset)
            .ok_or_else(|| ManagerError::UnknownAsset(asset.to_string()))?;
        Ok((kind, market))
    }
}

fn required_strategy(request: &MarketControlRequest) -> Result<StrategyKind, ManagerError> {
    let strategy = request.strategy.as_deref().ok_or_else(|| {
        ManagerError::InvalidInput("strategy is required for this action".to_string())
    })?;
    parse_strategy(strategy)
}

fn parse_address(value: &str) -> Result<Address, ManagerError> {
    Address::from_str(value.trim()).map_err(|e| ManagerError::InvalidInput(e.to_string()))
}

fn parse_amount(value: &str, decimals: u8) -> Result<u128, ManagerError> {
    parse_units(value, decimals).map_err(ManagerError::InvalidInput)
}

fn parse_strategy(value: &str) -> Result<StrategyKind, ManagerError> {
    value.trim().parse().map_err(ManagerError::InvalidInput)
}

/// `"1,234.5678 WETH"`
fn display_amount(amount: u128, listed: &ListedAsset) -> String {
    let precision = listed.listing.decimals.min(4);
    format!(
        "{} {}",
        format_units(amount, listed.listing.decimals, precision),
        listed.listing.symbol
    )
}
