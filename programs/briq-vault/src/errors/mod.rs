//! # Error Handling Module
//!
//! Every failure the vault engine can produce is a [`VaultError`]. Each
//! variant names the offending asset or backend where one exists, so the
//! caller always learns exactly what went wrong and where.
//!
//! ## How Errors Propagate
//!
//! ```rust,ignore
//! if amount == 0 {
//!     return Err(VaultError::InvalidAmount);
//! }
//! let usd = price_feeds.get_token_value_in_usd(&asset, amount)?;
//! ```
//!
//! Validation and access-control errors are returned before any state is
//! touched. Oracle and backend errors may be returned after partial work,
//! in which case the operation has already run its compensating steps.
//!
//! ## Error Codes
//!
//! [`VaultError::code`] returns a stable SCREAMING_SNAKE_CASE string that
//! the HTTP layer forwards to clients unchanged.

use thiserror::Error;

use crate::state::{Address, StrategyKind};

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VaultError>;

/// Broad class of a [`VaultError`].
///
/// The backend maps each category onto an HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Configuration,
    Oracle,
    Availability,
    Access,
    State,
    Math,
}

/// # VaultError
///
/// All possible errors raised by the price feed manager, share ledger,
/// strategy adapters, strategy coordinator and vault.
///
/// ## Error Categories:
///
/// | Category | Variants | Description |
/// |----------|----------|-------------|
/// | Validation | `InvalidAmount` .. `SlippageExceeded` | Bad caller input |
/// | Configuration | `UnsupportedToken` .. `TokenHasBalance` | Setup mistakes |
/// | Oracle | `PriceFeedNotFound` .. `InvalidPrice` | Price unavailable |
/// | Availability | `StrategyUnavailable` .. `MarketError` | Backend down or dry |
/// | Access | `NotOwner` .. `OnlyVaultOrOperator` | Permission denied |
/// | State | `VaultPaused` .. `ReentrantCall` | Invalid engine state |
/// | Math | `Overflow`, `DivisionByZero` | Arithmetic errors |
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    // ============================================
    // VALIDATION ERRORS
    // ============================================

    /// The amount provided is zero, or rounds to nothing.
    ///
    /// ## When this occurs:
    /// - Depositing 0 of an asset
    /// - Withdrawing 0 shares
    /// - A withdrawal whose USD entitlement converts to 0 tokens
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    /// Share amount is zero or exceeds the holder's balance.
    ///
    /// ## Example:
    /// ```text
    /// holder balance: 100e18 shares
    /// burn request:   150e18 shares → ERROR
    /// ```
    #[error("Invalid share amount: requested {requested}, available {available}")]
    InvalidShares { requested: u128, available: u128 },

    /// A configuration setter received the zero address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Token decimals outside the range the USD conversion supports.
    #[error("Invalid decimals {decimals} for token {asset}")]
    InvalidDecimals { asset: Address, decimals: u8 },

    /// The redeemed amount is below the caller's `min_amount_out`.
    #[error("Slippage exceeded for {asset}: received {received}, minimum {minimum}")]
    SlippageExceeded {
        asset: Address,
        received: u128,
        minimum: u128,
    },

    // ============================================
    // CONFIGURATION ERRORS
    // ============================================

    /// The asset is not supported where it was used.
    ///
    /// ## When this occurs:
    /// - Depositing an asset the vault does not list
    /// - Coordinator deposit when neither adapter supports the asset
    /// - Adapter deposit/withdraw for an asset it does not support
    #[error("Unsupported token {asset}")]
    UnsupportedToken { asset: Address },

    /// No pool or market has been configured for the asset yet.
    #[error("No pool configured for token {asset} on {strategy}")]
    NoPoolForToken {
        asset: Address,
        strategy: StrategyKind,
    },

    /// The configured market's base asset is a different token.
    #[error("Market base asset {base} does not match token {asset}")]
    UnsupportedTokenForPool { asset: Address, base: Address },

    /// A support toggle that would not change anything.
    ///
    /// ## When this occurs:
    /// - `add_supported_token` for an asset that is already supported
    /// - `remove_supported_token` for an asset that is not supported
    #[error("Token support unchanged for {asset}")]
    TokenSupportUnchanged { asset: Address },

    /// `set_vault` called with a different address after the vault was set.
    #[error("Vault already set to {current}")]
    VaultAlreadySet { current: Address },

    /// Delisting an asset that still has funds placed in a strategy.
    #[error("Token {asset} still holds {balance} in strategies")]
    TokenHasBalance { asset: Address, balance: u128 },

    // ============================================
    // ORACLE ERRORS
    // ============================================

    /// No price feed is registered for the asset.
    #[error("Price feed not found for token {asset}")]
    PriceFeedNotFound { asset: Address },

    /// The oracle's last update is older than the freshness window.
    ///
    /// ## Example:
    /// ```text
    /// window:     3600s
    /// updated_at: now - 5000s → ERROR
    /// ```
    #[error("Stale price for {asset}: updated at {updated_at}, now {now}, max age {max_age}s")]
    StalePrice {
        asset: Address,
        updated_at: i64,
        now: i64,
        max_age: u64,
    },

    /// The oracle reported a zero or negative price, or could not be read.
    #[error("Invalid price for {asset}: {reason}")]
    InvalidPrice { asset: Address, reason: String },

    // ============================================
    // BACKEND AVAILABILITY ERRORS
    // ============================================

    /// The named adapter is paused or its market is unreachable.
    #[error("Strategy {strategy} unavailable for {asset}")]
    StrategyUnavailable {
        strategy: StrategyKind,
        asset: Address,
    },

    /// Neither adapter can accept the asset right now.
    #[error("No strategy available for token {asset}")]
    NoStrategyAvailable { asset: Address },

    /// Total redeemable liquidity across adapters is below the request.
    #[error("Insufficient liquidity for {asset}: requested {requested}, available {available}")]
    InsufficientLiquidity {
        asset: Address,
        requested: u128,
        available: u128,
    },

    /// The external lending market rejected a call.
    #[error("Market error on {strategy}: {reason}")]
    MarketError {
        strategy: StrategyKind,
        reason: String,
    },

    // ============================================
    // ACCESS CONTROL ERRORS
    // ============================================

    /// Caller is not the component owner.
    #[error("Caller {caller} is not the owner")]
    NotOwner { caller: Address },

    /// Only the registered vault may call this.
    #[error("Only vault: caller {caller}")]
    OnlyVault { caller: Address },

    /// Only the registered coordinator may call this.
    #[error("Only coordinator: caller {caller}")]
    OnlyCoordinator { caller: Address },

    /// Emergency paths accept the vault, the owner or an operator.
    #[error("Only vault or operator: caller {caller}")]
    OnlyVaultOrOperator { caller: Address },

    // ============================================
    // STATE ERRORS
    // ============================================

    /// Deposits and withdrawals are paused.
    #[error("Vault is paused")]
    VaultPaused,

    /// A custody transfer would overdraw the holder.
    #[error("Insufficient {asset} balance for {holder}: required {required}, available {available}")]
    InsufficientTokenBalance {
        asset: Address,
        holder: Address,
        required: u128,
        available: u128,
    },

    /// Shares exist but the strategies report no value to back them.
    #[error("Vault value is zero while {total_supply} shares are outstanding")]
    ZeroVaultValue { total_supply: u128 },

    /// A deposit or withdrawal was entered while the same thread was
    /// already inside one.
    #[error("Reentrant vault operation")]
    ReentrantCall,

    // ============================================
    // MATH ERRORS
    // ============================================

    /// Arithmetic overflow.
    #[error("Arithmetic overflow")]
    Overflow,

    /// Division by zero.
    #[error("Division by zero")]
    DivisionByZero,
}

impl VaultError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            VaultError::InvalidAmount => "INVALID_AMOUNT",
            VaultError::InvalidShares { .. } => "INVALID_SHARES",
            VaultError::InvalidAddress(_) => "INVALID_ADDRESS",
            VaultError::InvalidDecimals { .. } => "INVALID_DECIMALS",
            VaultError::SlippageExceeded { .. } => "SLIPPAGE_EXCEEDED",
            VaultError::UnsupportedToken { .. } => "UNSUPPORTED_TOKEN",
            VaultError::NoPoolForToken { .. } => "NO_POOL_FOR_TOKEN",
            VaultError::UnsupportedTokenForPool { .. } => "UNSUPPORTED_TOKEN_FOR_POOL",
            VaultError::TokenSupportUnchanged { .. } => "TOKEN_SUPPORT_UNCHANGED",
            VaultError::VaultAlreadySet { .. } => "VAULT_ALREADY_SET",
            VaultError::TokenHasBalance { .. } => "TOKEN_HAS_BALANCE",
            VaultError::PriceFeedNotFound { .. } => "PRICE_FEED_NOT_FOUND",
            VaultError::StalePrice { .. } => "STALE_PRICE",
            VaultError::InvalidPrice { .. } => "INVALID_PRICE",
            VaultError::StrategyUnavailable { .. } => "STRATEGY_UNAVAILABLE",
            VaultError::NoStrategyAvailable { .. } => "NO_STRATEGY_AVAILABLE",
            VaultError::InsufficientLiquidity { .. } => "INSUFFICIENT_LIQUIDITY",
            VaultError::MarketError { .. } => "MARKET_ERROR",
            VaultError::NotOwner { .. } => "NOT_OWNER",
            VaultError::OnlyVault { .. } => "ONLY_VAULT",
            VaultError::OnlyCoordinator { .. } => "ONLY_COORDINATOR",
            VaultError::OnlyVaultOrOperator { .. } => "ONLY_VAULT_OR_OPERATOR",
            VaultError::VaultPaused => "VAULT_PAUSED",
            VaultError::InsufficientTokenBalance { .. } => "INSUFFICIENT_TOKEN_BALANCE",
            VaultError::ZeroVaultValue { .. } => "ZERO_VAULT_VALUE",
            VaultError::ReentrantCall => "REENTRANT_CALL",
            VaultError::Overflow => "OVERFLOW",
            VaultError::DivisionByZero => "DIVISION_BY_ZERO",
        }
    }

    /// Which branch of the error taxonomy this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            VaultError::InvalidAmount
            | VaultError::InvalidShares { .. }
            | VaultError::InvalidAddress(_)
            | VaultError::InvalidDecimals { .. }
            | VaultError::SlippageExceeded { .. } => ErrorCategory::Validation,

            VaultError::UnsupportedToken { .. }
            | VaultError::NoPoolForToken { .. }
            | VaultError::UnsupportedTokenForPool { .. }
            | VaultError::TokenSupportUnchanged { .. }
            | VaultError::VaultAlreadySet { .. }
            | VaultError::TokenHasBalance { .. } => ErrorCategory::Configuration,

            VaultError::PriceFeedNotFound { .. }
            | VaultError::StalePrice { .. }
            | VaultError::InvalidPrice { .. } => ErrorCategory::Oracle,

            VaultError::StrategyUnavailable { .. }
            | VaultError::NoStrategyAvailable { .. }
            | VaultError::InsufficientLiquidity { .. }
            | VaultError::MarketError { .. } => ErrorCategory::Availability,

            VaultError::NotOwner { .. }
            | VaultError::OnlyVault { .. }
            | VaultError::OnlyCoordinator { .. }
            | VaultError::OnlyVaultOrOperator { .. } => ErrorCategory::Access,

            VaultError::VaultPaused
            | VaultError::InsufficientTokenBalance { .. }
            | VaultError::ZeroVaultValue { .. }
            | VaultError::ReentrantCall => ErrorCategory::State,

            VaultError::Overflow | VaultError::DivisionByZero => ErrorCategory::Math,
        }
    }

    /// True for errors that a failover to the alternate adapter may cure.
    pub fn is_backend_failure(&self) -> bool {
        self.category() == ErrorCategory::Availability
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_categories() {
        let asset = Address::from_low_u64(7);
        let stale = VaultError::StalePrice {
            asset,
            updated_at: 0,
            now: 7200,
            max_age: 3600,
        };
        assert_eq!(stale.code(), "STALE_PRICE");
        assert_eq!(stale.category(), ErrorCategory::Oracle);
        assert!(!stale.is_backend_failure());

        let unavailable = VaultError::StrategyUnavailable {
            strategy: StrategyKind::Compound,
            asset,
        };
        assert!(unavailable.is_backend_failure());
        assert!(unavailable.to_string().contains("Compound"));
    }
}
