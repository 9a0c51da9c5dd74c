//! # API Response Models
//!
//! Structures for outgoing API response bodies.
//! All responses are wrapped in a standard format.
//!
//! Raw amounts are integer strings in base units; each comes with a
//! `formatted*` companion for display.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Standard API response wrapper.
///
/// All API responses follow this format:
///
/// ## Success Response
///
/// ```json
/// {
///     "success": true,
///     "data": { ... },
///     "error": null
/// }
/// ```
///
/// ## Error Response
///
/// ```json
/// {
///     "success": false,
///     "data": null,
///     "error": {
///         "code": "STALE_PRICE",
///         "message": "Stale price for 0x..: updated at 1700000000, now 1700003601"
///     }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    /// Whether the request was successful.
    pub success: bool,

    /// Response data (null on error).
    pub data: Option<T>,

    /// Error information (null on success).
    pub error: Option<ApiError>,
}

impl<T> ApiResponse<T> {
    /// Create a successful response with data.
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(code: &str, message: &str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.to_string(),
                message: message.to_string(),
            }),
        }
    }
}

/// API error information.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Stable error code (e.g., "NO_STRATEGY_AVAILABLE").
    pub code: String,

    /// Human-readable error message.
    pub message: String,
}

/// Result of `POST /vault/deposit`.
///
/// ## Example Response
///
/// ```json
/// {
///     "user": "0x..03e9",
///     "asset": "0x..1001",
///     "symbol": "USDC",
///     "amount": "100000000",
///     "formattedAmount": "100.00 USDC",
///     "usdValue": "100000000000000000000",
///     "formattedUsd": "$100.00",
///     "sharesMinted": "100000000000000000000",
///     "strategy": "aave"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositResponse {
    pub user: String,
    pub asset: String,
    pub symbol: String,
    pub amount: String,
    pub formatted_amount: String,
    pub usd_value: String,
    pub formatted_usd: String,
    pub shares_minted: String,
    /// Adapter that received the funds (after any failover).
    pub strategy: String,
}

/// Result of `POST /vault/withdraw`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawResponse {
    pub user: String,
    pub asset: String,
    pub symbol: String,
    pub shares_burned: String,
    pub usd_value: String,
    pub formatted_usd: String,
    pub amount_out: String,
    pub formatted_amount: String,
}

/// Result of `GET /vault/withdrawal-availability`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub asset: String,
    pub symbol: String,
    pub fully_available: bool,
    pub available_amount: String,
    pub requested_amount: String,
}

/// Result of `GET /vault/position/{user}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionResponse {
    pub user: String,
    pub shares: String,
    pub formatted_shares: String,
    pub usd_value: String,
    pub formatted_usd: String,
    /// Share of the pool in basis points.
    pub ownership_bps: u32,
}

/// Per-asset line of the TVL response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetTvl {
    pub asset: String,
    pub symbol: String,
    pub balance: String,
    pub formatted_balance: String,
    /// `None` when the price cannot be read.
    pub usd_value: Option<String>,
}

/// Total Value Locked response.
///
/// Returned by `GET /vault/tvl`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TvlResponse {
    pub total_value_usd: String,
    pub formatted_tvl: String,
    pub total_shares: String,
    /// USD per whole share, 18 decimals.
    pub price_per_share: String,
    pub assets: Vec<AssetTvl>,
    pub timestamp: DateTime<Utc>,
}

/// A supported token as listed by `GET /vault/tokens`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub symbol: String,
    pub address: String,
    pub decimals: u8,
    pub feed: String,
    /// Current price in dollars, `None` if stale or unavailable.
    pub price_usd: Option<String>,
    pub strategy: String,
}

/// Liquidity split by adapter, base units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidityResponse {
    pub total: String,
    pub from_aave: String,
    pub from_compound: String,
}

/// Result of `GET /strategy/{asset}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyInfoResponse {
    pub asset: String,
    pub symbol: String,
    pub assigned_strategy: String,
    pub strategy_balance: String,
    pub total_balance: String,
    pub formatted_total: String,
    pub apy_bps: u32,
    pub liquidity: LiquidityResponse,
    pub aave_available: bool,
    pub compound_available: bool,
}

/// One row of `GET /strategy/analytics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResponse {
    pub strategy: String,
    pub asset: String,
    pub symbol: Option<String>,
    pub current_balance: String,
    pub total_deposited: String,
    pub total_withdrawn: String,
    pub net_deposits: String,
    pub accrued_rewards: String,
    pub protocol_rewards: String,
    pub current_apy_bps: u32,
}

/// Result of a faucet mint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaucetResponse {
    pub user: String,
    pub asset: String,
    pub minted: String,
    pub balance: String,
    pub formatted_balance: String,
}

/// Generic response for admin operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    /// Operation performed, e.g. `"set-strategy"`.
    pub operation: String,

    /// Human-readable outcome.
    pub message: String,

    /// Amount moved, when the operation moves funds.
    pub amount: Option<String>,
}

/// Availability of one adapter for one asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyHealth {
    pub strategy: String,
    pub symbol: String,
    pub available: bool,
    pub apy_bps: u32,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `healthy`, `degraded` (some adapters or prices down) or `unhealthy`
    /// (an asset has no working strategy).
    pub status: String,
    pub vault_paused: bool,
    pub strategies: Vec<StrategyHealth>,
    /// Symbols whose price cannot currently be read.
    pub unpriced_assets: Vec<String>,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}
