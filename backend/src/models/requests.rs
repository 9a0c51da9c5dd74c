//! # API Request Models
//!
//! Structures for incoming API request bodies and query strings.
//!
//! ## Conventions
//!
//! - Addresses are `0x`-prefixed hex strings
//! - `asset` accepts either a token address or a listed symbol (`"USDC"`)
//! - Amounts are decimal strings in whole units (`"100.5"`), never floats

use serde::{Deserialize, Serialize};

/// Request to deposit a supported token.
///
/// ## Example JSON
///
/// ```json
/// {
///     "user": "0x00000000000000000000000000000000000003e9",
///     "asset": "USDC",
///     "amount": "100.00"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    /// Depositor address.
    pub user: String,

    /// Token symbol or address.
    pub asset: String,

    /// Amount in whole token units, e.g. `"100.5"` USDC.
    pub amount: String,
}

/// Request to burn shares for a token.
///
/// ## Example JSON
///
/// ```json
/// {
///     "user": "0x00000000000000000000000000000000000003e9",
///     "asset": "WETH",
///     "shares": "25.0",
///     "minAmountOut": "0.0124"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRequest {
    pub user: String,

    /// Token to receive.
    pub asset: String,

    /// Shares to burn, in whole BRIQ (18 decimals).
    pub shares: String,

    /// Optional: reject the withdrawal if fewer tokens than this arrive.
    pub min_amount_out: Option<String>,
}

/// Query parameters for `GET /vault/withdrawal-availability`.
///
/// ```text
/// /vault/withdrawal-availability?asset=USDC&shares=10
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalAvailabilityQuery {
    pub asset: String,
    pub shares: String,
}

/// Request to mint simulated tokens to a user.
///
/// **DEVELOPMENT ONLY** - the backend runs on simulated token custody.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaucetRequest {
    pub user: String,
    pub asset: String,
    pub amount: String,
}

/// Request to assign the preferred strategy for a token.
///
/// ## Example JSON
///
/// ```json
/// {
///     "caller": "0x0000000000000000000000000000000000000001",
///     "asset": "DAI",
///     "strategy": "aave"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetStrategyRequest {
    /// Must be the admin address.
    pub caller: String,
    pub asset: String,
    /// `"aave"` or `"compound"`.
    pub strategy: String,
}

/// Request to post a new USD price and re-register the token's feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPriceFeedRequest {
    pub caller: String,
    pub asset: String,

    /// Price in dollars, up to 8 decimal places.
    pub price: String,
}

/// Request to pull funds out of the strategies for a token.
///
/// Without `strategy`, every adapter is drained. With `strategy`,
/// `amount` is taken from that adapter only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyWithdrawRequest {
    pub caller: String,
    pub asset: String,
    pub strategy: Option<String>,
    pub amount: Option<String>,
}

/// Request to pause or resume the vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseRequest {
    pub caller: String,
    pub paused: bool,
}

/// Actions available on the simulated collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarketAction {
    /// Pause the lending market (supply and redeem fail).
    Pause,
    Resume,
    /// Make the lending market unreachable.
    Disconnect,
    Reconnect,
    /// Credit `amount` of interest to the adapter's position.
    AccrueInterest,
    /// Cap market cash at `amount`; no amount removes the cap.
    CashCap,
    /// Admin kill switch on the adapter itself.
    PauseAdapter,
    ResumeAdapter,
    /// Take the token's price feed offline.
    OracleOffline,
    OracleOnline,
    /// Stop refreshing the token's price so it goes stale.
    FreezePrice,
    UnfreezePrice,
}

/// Request to drive a simulated market or oracle.
///
/// ## Example JSON
///
/// ```json
/// {
///     "caller": "0x0000000000000000000000000000000000000001",
///     "strategy": "aave",
///     "asset": "USDC",
///     "action": "accrue-interest",
///     "amount": "12.5"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketControlRequest {
    pub caller: String,
    /// Required for market and adapter actions.
    pub strategy: Option<String>,
    pub asset: String,
    pub action: MarketAction,
    pub amount: Option<String>,
}

/// Query parameters for list endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitQuery {
    /// Max entries to return (default: 50, max: 500)
    pub limit: Option<usize>,
}

impl LimitQuery {
    pub fn resolved(&self) -> usize {
        self.limit.unwrap_or(50).min(500)
    }
}
