//! # Price Feed Manager
//!
//! Token → USD valuation with per-token decimal metadata and staleness
//! rejection.
//!
//! ## Scales
//!
//! ```text
//! oracle answer   any decimals  ──normalize──▶  price8  (8 decimals)
//! token amount    native decimals (6, 18, ...)
//! USD value       18 decimals
//!
//! usd18 = amount × price8 × 10^(18 − token_decimals − 8)
//! ```
//!
//! The inverse, [`PriceFeedManager::convert_usd_to_token`], always rounds
//! down so a withdrawal quote can never exceed what the USD value backs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::errors::{Result, VaultError};
use crate::events::{EventLog, PriceFeedUpdated, StalenessWindowUpdated};
use crate::math::{mul_div, pow10, rescale, Rounding, PRICE_DECIMALS, USD_DECIMALS};
use crate::state::{Address, Authority};

/// Default freshness window: one hour.
pub const DEFAULT_STALENESS_WINDOW: u64 = 3_600;

/// Largest token decimal count the conversions accept.
pub const MAX_TOKEN_DECIMALS: u8 = 30;

/// One answer from a price oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OracleRound {
    /// Raw answer. Signed because aggregator-style oracles report `int256`.
    pub answer: i128,
    /// Decimals of `answer`.
    pub decimals: u8,
    /// Unix seconds of the oracle's last update.
    pub updated_at: i64,
}

/// External price oracle backend, keyed by feed address.
pub trait PriceOracle: Send + Sync {
    fn latest_round(&self, feed: &Address) -> std::result::Result<OracleRound, String>;
}

/// # PriceFeedEntry
///
/// At most one per asset. Replaced in place by `set_price_feed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceFeedEntry {
    pub asset: Address,
    pub oracle: Address,
    /// Native decimals of the asset.
    pub decimals: u8,
    /// Oracle timestamp of the last price this manager accepted.
    pub last_update_timestamp: i64,
    /// Last accepted price at 8 decimals.
    pub last_price: u128,
}

/// # PriceFeedManager
///
/// ## Example
/// ```rust,ignore
/// manager.set_price_feed(&admin, usdc, usdc_feed, 6)?;
/// let usd = manager.get_token_value_in_usd(&usdc, 100_000_000)?; // 100 USDC
/// assert_eq!(usd, 100 * WAD);
/// ```
pub struct PriceFeedManager {
    address: Address,
    authority: Authority,
    oracle: Arc<dyn PriceOracle>,
    clock: Arc<dyn Clock>,
    events: Arc<EventLog>,
    staleness_window: AtomicU64,
    feeds: RwLock<HashMap<Address, PriceFeedEntry>>,
}

impl PriceFeedManager {
    pub fn new(
        address: Address,
        owner: Address,
        oracle: Arc<dyn PriceOracle>,
        clock: Arc<dyn Clock>,
        events: Arc<EventLog>,
    ) -> Self {
        Self {
            address,
            authority: Authority::new(owner),
            oracle,
            clock,
            events,
            staleness_window: AtomicU64::new(DEFAULT_STALENESS_WINDOW),
            feeds: RwLock::new(HashMap::new()),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    // ========================================
    // ADMIN CONFIGURATION
    // ========================================

    /// Register or replace the price feed for `asset`.
    ///
    /// ## Errors
    /// * `NotOwner` - caller is not the owner
    /// * `InvalidAddress` - `asset` or `oracle` is zero
    /// * `InvalidDecimals` - more than [`MAX_TOKEN_DECIMALS`]
    pub fn set_price_feed(
        &self,
        caller: &Address,
        asset: Address,
        oracle: Address,
        decimals: u8,
    ) -> Result<()> {
        self.authority.ensure_owner(caller)?;
        asset.ensure_non_zero("asset")?;
        oracle.ensure_non_zero("oracle")?;
        if decimals > MAX_TOKEN_DECIMALS {
            return Err(VaultError::InvalidDecimals { asset, decimals });
        }

        let entry = PriceFeedEntry {
            asset,
            oracle,
            decimals,
            last_update_timestamp: 0,
            last_price: 0,
        };
        self.feeds
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(asset, entry);

        self.events.emit(PriceFeedUpdated {
            asset,
            oracle,
            decimals,
            timestamp: self.clock.now(),
        });
        info!("Price feed for {} set to {} ({} decimals)", asset, oracle, decimals);
        Ok(())
    }

    /// Change the maximum accepted price age.
    pub fn set_staleness_window(&self, caller: &Address, seconds: u64) -> Result<()> {
        self.authority.ensure_owner(caller)?;
        if seconds == 0 {
            return Err(VaultError::InvalidAmount);
        }

        let old_seconds = self.staleness_window.swap(seconds, Ordering::SeqCst);
        if old_seconds != seconds {
            self.events.emit(StalenessWindowUpdated {
                old_seconds,
                new_seconds: seconds,
                timestamp: self.clock.now(),
            });
        }
        Ok(())
    }

    pub fn staleness_window(&self) -> u64 {
        self.staleness_window.load(Ordering::SeqCst)
    }

    // ========================================
    // QUERIES
    // ========================================

    pub fn has_price_feed(&self, asset: &Address) -> bool {
        self.feeds
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(asset)
    }

    /// Snapshot of the entry for `asset`.
    pub fn get_price_feed(&self, asset: &Address) -> Result<PriceFeedEntry> {
        self.feeds
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(asset)
            .cloned()
            .ok_or(VaultError::PriceFeedNotFound { asset: *asset })
    }

    pub fn get_token_decimals(&self, asset: &Address) -> Result<u8> {
        Ok(self.get_price_feed(asset)?.decimals)
    }

    /// Latest USD price of `asset` at 8 decimals.
    ///
    /// ## Errors
    /// * `PriceFeedNotFound` - no feed registered
    /// * `InvalidPrice` - oracle unreadable or answer ≤ 0
    /// * `StalePrice` - oracle update older than the freshness window
    pub fn get_token_price(&self, asset: &Address) -> Result<u128> {
        let entry = self.get_price_feed(asset)?;

        let round = self
            .oracle
            .latest_round(&entry.oracle)
            .map_err(|reason| VaultError::InvalidPrice {
                asset: *asset,
                reason,
            })?;

        if round.answer <= 0 {
            return Err(VaultError::InvalidPrice {
                asset: *asset,
                reason: format!("non-positive answer {}", round.answer),
            });
        }

        let now = self.clock.now();
        let max_age = self.staleness_window();
        let age = now.saturating_sub(round.updated_at).max(0) as u64;
        if age > max_age {
            warn!("Stale price for {}: {}s old (max {}s)", asset, age, max_age);
            return Err(VaultError::StalePrice {
                asset: *asset,
                updated_at: round.updated_at,
                now,
                max_age,
            });
        }

        let price = rescale(round.answer as u128, round.decimals, PRICE_DECIMALS)?;
        if price == 0 {
            return Err(VaultError::InvalidPrice {
                asset: *asset,
                reason: "answer rounds to zero at 8 decimals".to_string(),
            });
        }

        if let Some(cached) = self
            .feeds
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(asset)
        {
            cached.last_price = price;
            cached.last_update_timestamp = round.updated_at;
        }

        Ok(price)
    }

    /// USD value at 18 decimals of `amount` (native decimals) of `asset`.
    pub fn get_token_value_in_usd(&self, asset: &Address, amount: u128) -> Result<u128> {
        if amount == 0 {
            return Ok(0);
        }
        let decimals = self.get_token_decimals(asset)?;
        let price = self.get_token_price(asset)?;
        let usd = amount_to_usd(amount, price, decimals)?;
        debug!("{} units of {} valued at {} (usd18)", amount, asset, usd);
        Ok(usd)
    }

    /// Like [`get_token_value_in_usd`](Self::get_token_value_in_usd), but a
    /// stale or unreadable oracle falls back to the last accepted price.
    /// Fails as the strict version does when no price was ever accepted.
    pub fn get_token_value_in_usd_or_last(&self, asset: &Address, amount: u128) -> Result<u128> {
        match self.get_token_value_in_usd(asset, amount) {
            Ok(usd) => Ok(usd),
            Err(e @ (VaultError::StalePrice { .. } | VaultError::InvalidPrice { .. })) => {
                let entry = self.get_price_feed(asset)?;
                if entry.last_price == 0 {
                    return Err(e);
                }
                debug!(
                    "Valuing {} at last accepted price {} ({})",
                    asset, entry.last_price, e
                );
                amount_to_usd(amount, entry.last_price, entry.decimals)
            }
            Err(e) => Err(e),
        }
    }

    /// Token amount worth `usd` (18 decimals), rounded down.
    pub fn convert_usd_to_token(&self, asset: &Address, usd: u128) -> Result<u128> {
        if usd == 0 {
            return Ok(0);
        }
        let decimals = self.get_token_decimals(asset)?;
        let price = self.get_token_price(asset)?;
        usd_to_amount(usd, price, decimals)
    }
}

/// `amount × price8 × 10^(18 − decimals − 8)`, rounded down.
pub fn amount_to_usd(amount: u128, price8: u128, decimals: u8) -> Result<u128> {
    let source = u32::from(decimals) + u32::from(PRICE_DECIMALS);
    let target = u32::from(USD_DECIMALS);
    if source >= target {
        mul_div(amount, price8, pow10(source - target)?, Rounding::Floor)
    } else {
        let scaled_price = price8
            .checked_mul(pow10(target - source)?)
            .ok_or(VaultError::Overflow)?;
        mul_div(amount, scaled_price, 1, Rounding::Floor)
    }
}

/// Inverse of [`amount_to_usd`], rounded down.
pub fn usd_to_amount(usd: u128, price8: u128, decimals: u8) -> Result<u128> {
    let source = u32::from(decimals) + u32::from(PRICE_DECIMALS);
    let target = u32::from(USD_DECIMALS);
    if source >= target {
        mul_div(usd, pow10(source - target)?, price8, Rounding::Floor)
    } else {
        let scaled_price = price8
            .checked_mul(pow10(target - source)?)
            .ok_or(VaultError::Overflow)?;
        mul_div(usd, 1, scaled_price, Rounding::Floor)
    }
}
