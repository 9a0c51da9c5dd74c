//! # API Request Handlers
//!
//! This module contains the handler functions for each API endpoint.
//! Each handler:
//! 1. Extracts request data
//! 2. Calls the appropriate service
//! 3. Returns a formatted response
//!
//! ## Error Handling
//!
//! All errors are returned as JSON with a stable code:
//!
//! ```json
//! {
//!     "success": false,
//!     "error": {
//!         "code": "NO_STRATEGY_AVAILABLE",
//!         "message": "No strategy available for 0x..1001"
//!     }
//! }
//! ```
//!
//! | Error category | HTTP status |
//! |----------------|-------------|
//! | Validation, Configuration, malformed input | 400 |
//! | Access, non-admin caller | 403 |
//! | Unknown asset | 404 |
//! | State (paused, balance) | 409 |
//! | Oracle, Availability | 503 |
//! | Math | 500 |

use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use briq_vault::ErrorCategory;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::models::{
    ApiResponse, DepositRequest, EmergencyWithdrawRequest, FaucetRequest, LimitQuery,
    MarketControlRequest, PauseRequest, SetPriceFeedRequest, SetStrategyRequest,
    WithdrawRequest, WithdrawalAvailabilityQuery,
};
use crate::services::ManagerError;
use crate::AppState;

/// HTTP status for a service error.
pub fn status_code(error: &ManagerError) -> StatusCode {
    match error {
        ManagerError::Vault(e) => match e.category() {
            ErrorCategory::Validation | ErrorCategory::Configuration => StatusCode::BAD_REQUEST,
            ErrorCategory::Access => StatusCode::FORBIDDEN,
            ErrorCategory::State => StatusCode::CONFLICT,
            ErrorCategory::Oracle | ErrorCategory::Availability => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCategory::Math => StatusCode::INTERNAL_SERVER_ERROR,
        },
        ManagerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ManagerError::Unauthorized(_) => StatusCode::FORBIDDEN,
        ManagerError::UnknownAsset(_) => StatusCode::NOT_FOUND,
    }
}

fn respond<T: Serialize>(operation: &str, result: Result<T, ManagerError>) -> HttpResponse {
    match result {
        Ok(data) => HttpResponse::Ok().json(ApiResponse::success(data)),
        Err(e) => {
            warn!("{} failed: {}", operation, e);
            HttpResponse::build(status_code(&e)).json(ApiResponse::<()>::error(e.code(), &e.to_string()))
        }
    }
}

/// API information endpoint (root).
///
/// ## Endpoint
///
/// `GET /`
pub async fn api_info() -> HttpResponse {
    let info = json!({
        "name": "Briq Vault API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Multi-asset yield routing vault with USD-normalized shares",
        "endpoints": {
            "health": { "method": "GET", "path": "/health" },
            "vault": {
                "deposit": { "method": "POST", "path": "/vault/deposit" },
                "withdraw": { "method": "POST", "path": "/vault/withdraw" },
                "withdrawalAvailability": { "method": "GET", "path": "/vault/withdrawal-availability" },
                "position": { "method": "GET", "path": "/vault/position/{user}" },
                "tvl": { "method": "GET", "path": "/vault/tvl" },
                "tokens": { "method": "GET", "path": "/vault/tokens" },
                "faucet": { "method": "POST", "path": "/vault/faucet" }
            },
            "strategy": {
                "info": { "method": "GET", "path": "/strategy/{asset}" },
                "analytics": { "method": "GET", "path": "/strategy/analytics" }
            },
            "admin": {
                "strategy": { "method": "POST", "path": "/admin/strategy" },
                "priceFeed": { "method": "POST", "path": "/admin/price-feed" },
                "emergencyWithdraw": { "method": "POST", "path": "/admin/emergency-withdraw" },
                "pause": { "method": "POST", "path": "/admin/pause" },
                "market": { "method": "POST", "path": "/admin/market" }
            },
            "monitor": {
                "alerts": { "method": "GET", "path": "/monitor/alerts" },
                "tvlHistory": { "method": "GET", "path": "/monitor/tvl-history" },
                "events": { "method": "GET", "path": "/monitor/events" },
                "reconciliation": { "method": "GET", "path": "/monitor/reconciliation" }
            }
        }
    });

    HttpResponse::Ok().json(ApiResponse::success(info))
}

/// Health check endpoint.
///
/// ## Endpoint
///
/// `GET /health`
///
/// ## Example
///
/// ```bash
/// curl http://127.0.0.1:8080/health
/// ```
///
/// Returns 503 when some asset has no working strategy.
pub async fn health_check(state: web::Data<Arc<AppState>>) -> HttpResponse {
    let health = state.vault_manager.health();
    let status = if health.status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    HttpResponse::build(status).json(ApiResponse::success(health))
}

// ==========================================
// VAULT
// ==========================================

/// Deposit a supported token.
///
/// ## Endpoint
///
/// `POST /vault/deposit`
///
/// ```bash
/// curl -X POST http://127.0.0.1:8080/vault/deposit \
///   -H "Content-Type: application/json" \
///   -d '{
///     "user": "0x00000000000000000000000000000000000003e9",
///     "asset": "USDC",
///     "amount": "100"
///   }'
/// ```
///
/// ## Errors
///
/// - `400 INVALID_AMOUNT` - zero or dust amount
/// - `404 UNKNOWN_ASSET` - symbol not listed
/// - `409 INSUFFICIENT_TOKEN_BALANCE` - fund the user via `/vault/faucet` first
/// - `503 STALE_PRICE` / `NO_STRATEGY_AVAILABLE`
pub async fn deposit(state: web::Data<Arc<AppState>>, body: web::Json<DepositRequest>) -> HttpResponse {
    info!("Deposit request: {} {} for {}", body.amount, body.asset, body.user);
    respond("Deposit", state.vault_manager.deposit(body.into_inner()))
}

/// Burn shares for any supported token.
///
/// ## Endpoint
///
/// `POST /vault/withdraw`
///
/// ```bash
/// curl -X POST http://127.0.0.1:8080/vault/withdraw \
///   -H "Content-Type: application/json" \
///   -d '{
///     "user": "0x00000000000000000000000000000000000003e9",
///     "asset": "WETH",
///     "shares": "25",
///     "minAmountOut": "0.012"
///   }'
/// ```
///
/// ## Errors
///
/// - `400 INVALID_SHARES` - more shares than held
/// - `400 SLIPPAGE_EXCEEDED` - fewer tokens than `minAmountOut`
/// - `503 INSUFFICIENT_LIQUIDITY` - strategies cannot cover the amount
pub async fn withdraw(state: web::Data<Arc<AppState>>, body: web::Json<WithdrawRequest>) -> HttpResponse {
    info!("Withdraw request: {} shares to {} for {}", body.shares, body.asset, body.user);
    respond("Withdraw", state.vault_manager.withdraw(body.into_inner()))
}

/// Dry run of a withdrawal.
///
/// ## Endpoint
///
/// `GET /vault/withdrawal-availability?asset=USDC&shares=10`
pub async fn withdrawal_availability(
    state: web::Data<Arc<AppState>>,
    query: web::Query<WithdrawalAvailabilityQuery>,
) -> HttpResponse {
    respond(
        "Withdrawal availability",
        state.vault_manager.withdrawal_availability(query.into_inner()),
    )
}

/// Shares and USD value of a user.
///
/// ## Endpoint
///
/// `GET /vault/position/{user}`
pub async fn get_position(state: web::Data<Arc<AppState>>, path: web::Path<String>) -> HttpResponse {
    respond("Position", state.vault_manager.position(&path.into_inner()))
}

/// Total Value Locked.
///
/// ## Endpoint
///
/// `GET /vault/tvl`
pub async fn get_tvl(state: web::Data<Arc<AppState>>) -> HttpResponse {
    respond("TVL", state.vault_manager.tvl())
}

/// Supported tokens with their current price and strategy.
///
/// ## Endpoint
///
/// `GET /vault/tokens`
pub async fn get_tokens(state: web::Data<Arc<AppState>>) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::success(state.vault_manager.tokens()))
}

/// Mint simulated tokens.
///
/// **DEVELOPMENT ONLY**
///
/// ## Endpoint
///
/// `POST /vault/faucet`
///
/// ```bash
/// curl -X POST http://127.0.0.1:8080/vault/faucet \
///   -H "Content-Type: application/json" \
///   -d '{"user": "0x00000000000000000000000000000000000003e9", "asset": "USDC", "amount": "1000"}'
/// ```
pub async fn faucet(state: web::Data<Arc<AppState>>, body: web::Json<FaucetRequest>) -> HttpResponse {
    respond("Faucet", state.vault_manager.faucet(body.into_inner()))
}

// ==========================================
// STRATEGY
// ==========================================

/// Balance, APY, liquidity split and availability for one asset.
///
/// ## Endpoint
///
/// `GET /strategy/{asset}`
pub async fn get_strategy(state: web::Data<Arc<AppState>>, path: web::Path<String>) -> HttpResponse {
    respond("Strategy info", state.vault_manager.strategy_info(&path.into_inner()))
}

/// Analytics rows for both adapters.
///
/// ## Endpoint
///
/// `GET /strategy/analytics`
pub async fn get_analytics(state: web::Data<Arc<AppState>>) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::success(state.vault_manager.analytics()))
}

// ==========================================
// ADMIN
// ==========================================

/// Assign the preferred strategy for a token.
///
/// ## Endpoint
///
/// `POST /admin/strategy`
///
/// ## Errors
///
/// - `403 NOT_OWNER` - caller is not the admin
pub async fn set_strategy(state: web::Data<Arc<AppState>>, body: web::Json<SetStrategyRequest>) -> HttpResponse {
    respond("Set strategy", state.vault_manager.set_strategy(body.into_inner()))
}

/// Post a new price and re-register the feed.
///
/// ## Endpoint
///
/// `POST /admin/price-feed`
pub async fn set_price_feed(
    state: web::Data<Arc<AppState>>,
    body: web::Json<SetPriceFeedRequest>,
) -> HttpResponse {
    respond("Set price feed", state.vault_manager.set_price_feed(body.into_inner()))
}

/// Drain a token from every adapter, or part of it from one.
///
/// ## Endpoint
///
/// `POST /admin/emergency-withdraw`
///
/// ## Errors
///
/// - `403 ONLY_VAULT_OR_OPERATOR` - caller is not an operator
pub async fn emergency_withdraw(
    state: web::Data<Arc<AppState>>,
    body: web::Json<EmergencyWithdrawRequest>,
) -> HttpResponse {
    warn!("Emergency withdrawal requested by {} for {}", body.caller, body.asset);
    respond("Emergency withdrawal", state.vault_manager.emergency_withdraw(body.into_inner()))
}

/// Pause or resume deposits and withdrawals.
///
/// ## Endpoint
///
/// `POST /admin/pause`
pub async fn set_paused(state: web::Data<Arc<AppState>>, body: web::Json<PauseRequest>) -> HttpResponse {
    respond("Pause", state.vault_manager.set_paused(body.into_inner()))
}

/// Drive a simulated market, adapter or oracle.
///
/// **DEVELOPMENT ONLY**
///
/// ## Endpoint
///
/// `POST /admin/market`
///
/// ```bash
/// curl -X POST http://127.0.0.1:8080/admin/market \
///   -H "Content-Type: application/json" \
///   -d '{
///     "caller": "0x0000000000000000000000000000000000000001",
///     "strategy": "aave",
///     "asset": "USDC",
///     "action": "disconnect"
///   }'
/// ```
pub async fn market_control(
    state: web::Data<Arc<AppState>>,
    body: web::Json<MarketControlRequest>,
) -> HttpResponse {
    respond("Market control", state.vault_manager.market_control(body.into_inner()))
}

// ==========================================
// MONITORING
// ==========================================

/// Recent alerts, newest first.
///
/// ## Endpoint
///
/// `GET /monitor/alerts?limit=50`
pub async fn get_alerts(state: web::Data<Arc<AppState>>, query: web::Query<LimitQuery>) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::success(state.alerts.recent(query.resolved())))
}

/// TVL snapshots, newest first.
///
/// ## Endpoint
///
/// `GET /monitor/tvl-history?limit=50`
pub async fn get_tvl_history(state: web::Data<Arc<AppState>>, query: web::Query<LimitQuery>) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::success(
        state.balance_tracker.tvl_history(query.resolved()),
    ))
}

/// Recent engine events, newest first.
///
/// ## Endpoint
///
/// `GET /monitor/events?limit=50`
pub async fn get_events(state: web::Data<Arc<AppState>>, query: web::Query<LimitQuery>) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::success(
        state.vault_manager.recent_events(query.resolved()),
    ))
}

/// Run a reconciliation pass now.
///
/// ## Endpoint
///
/// `GET /monitor/reconciliation`
pub async fn reconcile(state: web::Data<Arc<AppState>>) -> HttpResponse {
    respond("Reconciliation", state.balance_tracker.reconcile())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::configure_routes;
    use crate::config::AppConfig;
    use crate::services::VaultManager;
    use actix_web::{test, App};
    use briq_vault::sim::ManualClock;
    use briq_vault::{Address, VaultError};
    use serde_json::Value;

    const ADMIN: &str = "0x0000000000000000000000000000000000000001";
    const ALICE: &str = "0x00000000000000000000000000000000000003e9";

    fn app_state() -> web::Data<Arc<AppState>> {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        let manager =
            VaultManager::with_clock(config.clone(), Arc::new(ManualClock::new(1_700_000_000))).unwrap();
        web::Data::new(Arc::new(AppState::new(manager, config)))
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(App::new().app_data($state.clone()).configure(configure_routes)).await
        };
    }

    #[actix_web::test]
    async fn test_deposit_then_position() {
        let state = app_state();
        let app = app!(state);

        let faucet = test::TestRequest::post()
            .uri("/vault/faucet")
            .set_json(json!({ "user": ALICE, "asset": "USDC", "amount": "250" }))
            .to_request();
        assert_eq!(test::call_service(&app, faucet).await.status(), StatusCode::OK);

        let deposit = test::TestRequest::post()
            .uri("/vault/deposit")
            .set_json(json!({ "user": ALICE, "asset": "USDC", "amount": "250" }))
            .to_request();
        let resp = test::call_service(&app, deposit).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["sharesMinted"], "250000000000000000000");
        assert_eq!(body["data"]["strategy"], "Aave");

        let position = test::TestRequest::get()
            .uri(&format!("/vault/position/{}", ALICE))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, position).await;
        assert_eq!(body["data"]["formattedUsd"], "$250.00");
        assert_eq!(body["data"]["ownershipBps"], 10_000);
    }

    #[actix_web::test]
    async fn test_errors_map_to_status_codes() {
        let state = app_state();
        let app = app!(state);

        let unknown = test::TestRequest::post()
            .uri("/vault/deposit")
            .set_json(json!({ "user": ALICE, "asset": "DOGE", "amount": "1" }))
            .to_request();
        let resp = test::call_service(&app, unknown).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "UNKNOWN_ASSET");

        let unfunded = test::TestRequest::post()
            .uri("/vault/deposit")
            .set_json(json!({ "user": ALICE, "asset": "USDC", "amount": "1" }))
            .to_request();
        assert_eq!(test::call_service(&app, unfunded).await.status(), StatusCode::CONFLICT);

        let not_admin = test::TestRequest::post()
            .uri("/admin/strategy")
            .set_json(json!({ "caller": ALICE, "asset": "USDC", "strategy": "compound" }))
            .to_request();
        let resp = test::call_service(&app, not_admin).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "NOT_OWNER");
    }

    #[actix_web::test]
    async fn test_outage_is_service_unavailable() {
        let state = app_state();
        let app = app!(state);

        for strategy in ["aave", "compound"] {
            let req = test::TestRequest::post()
                .uri("/admin/market")
                .set_json(json!({
                    "caller": ADMIN,
                    "strategy": strategy,
                    "asset": "USDC",
                    "action": "pause-adapter"
                }))
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        }

        state
            .vault_manager
            .faucet(crate::models::FaucetRequest {
                user: ALICE.to_string(),
                asset: "USDC".to_string(),
                amount: "10".to_string(),
            })
            .unwrap();
        let deposit = test::TestRequest::post()
            .uri("/vault/deposit")
            .set_json(json!({ "user": ALICE, "asset": "USDC", "amount": "10" }))
            .to_request();
        let resp = test::call_service(&app, deposit).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "NO_STRATEGY_AVAILABLE");

        let health = test::TestRequest::get().uri("/health").to_request();
        assert_eq!(
            test::call_service(&app, health).await.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[actix_web::test]
    async fn test_analytics_route_is_not_an_asset() {
        let state = app_state();
        let app = app!(state);

        let analytics = test::TestRequest::get().uri("/strategy/analytics").to_request();
        let body: Value = test::call_and_read_body_json(&app, analytics).await;
        assert!(body["data"].is_array());

        let info = test::TestRequest::get().uri("/strategy/weth").to_request();
        let body: Value = test::call_and_read_body_json(&app, info).await;
        assert_eq!(body["data"]["symbol"], "WETH");
        assert_eq!(body["data"]["apyBps"], 420);
    }

    #[::core::prelude::v1::test]
    fn test_status_codes() {
        let asset = Address::from_low_u64(7);
        let cases = [
            (VaultError::InvalidAmount, StatusCode::BAD_REQUEST),
            (VaultError::UnsupportedToken { asset }, StatusCode::BAD_REQUEST),
            (VaultError::NotOwner { caller: asset }, StatusCode::FORBIDDEN),
            (VaultError::VaultPaused, StatusCode::CONFLICT),
            (VaultError::NoStrategyAvailable { asset }, StatusCode::SERVICE_UNAVAILABLE),
            (VaultError::Overflow, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            assert_eq!(status_code(&ManagerError::Vault(error)), expected);
        }
        assert_eq!(
            status_code(&ManagerError::UnknownAsset("DOGE".to_string())),
            StatusCode::NOT_FOUND
        );
    }
}
