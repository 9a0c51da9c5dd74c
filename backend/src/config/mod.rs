//! # Configuration Module
//!
//! This module handles loading and validating configuration from
//! environment variables. All settings are centralized here.
//!
//! ## Usage
//!
//! ```rust,ignore
//! dotenvy::dotenv().ok();
//! let config = AppConfig::from_env()?;
//! println!("Admin: {}", config.admin_address);
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `SERVER_HOST` | HTTP server host | `127.0.0.1` |
//! | `SERVER_PORT` | HTTP server port | `8080` |
//! | `ADMIN_ADDRESS` | Owner of every vault component | `0x00..01` |
//! | `PRICE_STALENESS_SECONDS` | Oracle freshness window | `3600` |
//! | `SHARE_PRICING_MODE` | `usd` or `token-rescale` | `usd` |
//! | `SEED_ASSETS` | `SYMBOL:decimals:price[:strategy]`, comma separated | USDC, DAI, WETH |
//! | `HEALTH_CHECK_INTERVAL` | Seconds between strategy health checks | `30` |
//! | `RECONCILIATION_INTERVAL` | Seconds between reconciliations | `300` |
//! | `RECONCILIATION_TOLERANCE_BPS` | Allowed share/strategy value drift | `100` |
//! | `LOW_LIQUIDITY_THRESHOLD_USD` | Alert below this much liquidity per asset | `1000` |

use std::env;
use std::str::FromStr;

use briq_vault::price_feed::DEFAULT_STALENESS_WINDOW;
use briq_vault::{Address, SharePricing, StrategyKind};
use thiserror::Error;

use crate::utils::parse_units;

const DEFAULT_SEED_ASSETS: &str = "USDC:6:1.00:aave,DAI:18:1.00:compound,WETH:18:2000.00:aave";

/// Errors that can occur when loading configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    /// Failed to parse a value
    #[error("Failed to parse {0}: {1}")]
    ParseError(String, String),
}

/// An asset registered with the vault at start-up.
///
/// ## Format
///
/// `SYMBOL:decimals:price[:strategy]`, e.g. `WETH:18:2000.00:compound`.
/// The price is in dollars; the strategy defaults to Aave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedAsset {
    pub symbol: String,
    pub decimals: u8,
    /// USD price at 8 decimals.
    pub price: u128,
    pub strategy: StrategyKind,
}

impl FromStr for SeedAsset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if !(3..=4).contains(&parts.len()) {
            return Err(format!("expected SYMBOL:decimals:price[:strategy], got '{}'", s));
        }

        let symbol = parts[0].trim().to_ascii_uppercase();
        if symbol.is_empty() {
            return Err("empty symbol".to_string());
        }
        let decimals: u8 = parts[1]
            .trim()
            .parse()
            .map_err(|_| format!("bad decimals '{}'", parts[1]))?;
        let price = parse_units(parts[2].trim(), 8)?;
        if price == 0 {
            return Err(format!("price of {} must be positive", symbol));
        }
        let strategy = match parts.get(3) {
            Some(kind) => kind.trim().parse()?,
            None => StrategyKind::Aave,
        };

        Ok(Self {
            symbol,
            decimals,
            price,
            strategy,
        })
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // ==========================================
    // SERVER SETTINGS
    // ==========================================

    /// HTTP server host address.
    ///
    /// Use `127.0.0.1` for localhost only, `0.0.0.0` to accept
    /// connections from any interface.
    pub server_host: String,

    /// HTTP server port number.
    pub server_port: u16,

    // ==========================================
    // VAULT SETTINGS
    // ==========================================

    /// Owner of the vault, coordinator, adapters and price feed manager.
    ///
    /// Admin endpoints must name this address as `caller`.
    pub admin_address: Address,

    /// Maximum accepted age of an oracle price, in seconds.
    pub price_staleness_seconds: u64,

    /// How the first deposit is priced.
    pub share_pricing: SharePricing,

    /// Assets listed at start-up.
    pub seed_assets: Vec<SeedAsset>,

    // ==========================================
    // MONITORING SETTINGS
    // ==========================================

    /// How often the monitor checks strategies and prices (in seconds).
    pub health_check_interval: u64,

    /// How often to run full reconciliation (in seconds).
    pub reconciliation_interval: u64,

    /// Drift between share value and strategy value that still counts
    /// as reconciled, in basis points.
    pub reconciliation_tolerance_bps: u32,

    /// Available liquidity below this many dollars raises an alert.
    pub low_liquidity_threshold_usd: u128,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// ## Returns
    ///
    /// - `Ok(AppConfig)` - Configuration loaded successfully
    /// - `Err(ConfigError)` - A variable is present but invalid
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let admin_address = parse_var::<Address>("ADMIN_ADDRESS", &get("ADMIN_ADDRESS", "0x0000000000000000000000000000000000000001"))?;
        if admin_address.is_zero() {
            return Err(ConfigError::InvalidValue(
                "ADMIN_ADDRESS".to_string(),
                "must not be the zero address".to_string(),
            ));
        }

        let price_staleness_seconds = parse_var::<u64>(
            "PRICE_STALENESS_SECONDS",
            &get("PRICE_STALENESS_SECONDS", &DEFAULT_STALENESS_WINDOW.to_string()),
        )?;
        if price_staleness_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "PRICE_STALENESS_SECONDS".to_string(),
                "must be positive".to_string(),
            ));
        }

        let seed_assets = get("SEED_ASSETS", DEFAULT_SEED_ASSETS)
            .split(',')
            .filter(|entry| !entry.trim().is_empty())
            .map(|entry| parse_var::<SeedAsset>("SEED_ASSETS", entry))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            // Server
            server_host: get("SERVER_HOST", "127.0.0.1"),
            server_port: parse_var("SERVER_PORT", &get("SERVER_PORT", "8080"))?,

            // Vault
            admin_address,
            price_staleness_seconds,
            share_pricing: parse_var("SHARE_PRICING_MODE", &get("SHARE_PRICING_MODE", "usd"))?,
            seed_assets,

            // Monitoring
            health_check_interval: parse_var("HEALTH_CHECK_INTERVAL", &get("HEALTH_CHECK_INTERVAL", "30"))?,
            reconciliation_interval: parse_var("RECONCILIATION_INTERVAL", &get("RECONCILIATION_INTERVAL", "300"))?,
            reconciliation_tolerance_bps: parse_var(
                "RECONCILIATION_TOLERANCE_BPS",
                &get("RECONCILIATION_TOLERANCE_BPS", "100"),
            )?,
            low_liquidity_threshold_usd: parse_var(
                "LOW_LIQUIDITY_THRESHOLD_USD",
                &get("LOW_LIQUIDITY_THRESHOLD_USD", "1000"),
            )?,
        })
    }
}

/// Parse `value` for `key`, naming the key in the error.
fn parse_var<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::ParseError(key.to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.admin_address, Address::from_low_u64(1));
        assert_eq!(config.price_staleness_seconds, 3_600);
        assert_eq!(config.share_pricing, SharePricing::UsdNormalized);
        assert_eq!(config.seed_assets.len(), 3);
        assert_eq!(config.seed_assets[1].strategy, StrategyKind::Compound);
        assert_eq!(config.seed_assets[2].price, 200_000_000_000);
    }

    #[test]
    fn test_seed_asset_parsing() {
        let asset: SeedAsset = "wbtc:8:65000.5:compound".parse().unwrap();
        assert_eq!(asset.symbol, "WBTC");
        assert_eq!(asset.decimals, 8);
        assert_eq!(asset.price, 6_500_050_000_000);
        assert_eq!(asset.strategy, StrategyKind::Compound);

        assert!("USDC:6".parse::<SeedAsset>().is_err());
        assert!("USDC:6:0".parse::<SeedAsset>().is_err());
        assert!("USDC:6:1:venus".parse::<SeedAsset>().is_err());
    }

    #[test]
    fn test_invalid_values_fail_startup() {
        assert!(matches!(
            config_from(&[("SERVER_PORT", "eighty")]),
            Err(ConfigError::ParseError(key, _)) if key == "SERVER_PORT"
        ));
        assert!(matches!(
            config_from(&[("ADMIN_ADDRESS", "0x0000000000000000000000000000000000000000")]),
            Err(ConfigError::InvalidValue(..))
        ));
        assert!(matches!(
            config_from(&[("SHARE_PRICING_MODE", "magic")]),
            Err(ConfigError::ParseError(..))
        ));
        assert!(matches!(
            config_from(&[("PRICE_STALENESS_SECONDS", "0")]),
            Err(ConfigError::InvalidValue(..))
        ));
    }
}
