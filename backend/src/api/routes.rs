//! # API Route Configuration
//!
//! This module sets up all the HTTP routes for the API.

use actix_web::web;

use super::handlers;

/// Configure all API routes.
///
/// This function is called from main.rs to set up
/// all the endpoint routes.
///
/// ## Route Structure
///
/// ```text
/// /
/// ├── /health                      GET  - Health check
/// ├── /vault
/// │   ├── /deposit                 POST - Deposit tokens
/// │   ├── /withdraw                POST - Burn shares
/// │   ├── /withdrawal-availability GET  - Dry run
/// │   ├── /position/:user          GET  - User position
/// │   ├── /tvl                     GET  - Total Value Locked
/// │   ├── /tokens                  GET  - Supported tokens
/// │   └── /faucet                  POST - Mint simulated tokens
/// ├── /strategy
/// │   ├── /analytics               GET  - Per-adapter analytics
/// │   └── /:asset                  GET  - Strategy state
/// ├── /admin
/// │   ├── /strategy                POST - Assign strategy
/// │   ├── /price-feed              POST - Update price
/// │   ├── /emergency-withdraw      POST - Drain adapters
/// │   ├── /pause                   POST - Pause vault
/// │   └── /market                  POST - Drive simulated markets
/// └── /monitor
///     ├── /alerts                  GET  - Recent alerts
///     ├── /tvl-history             GET  - TVL snapshots
///     ├── /events                  GET  - Engine events
///     └── /reconciliation          GET  - Reconcile now
/// ```
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Root endpoint - API information
        .route("/", web::get().to(handlers::api_info))

        // Health check endpoint
        .route("/health", web::get().to(handlers::health_check))

        // Vault endpoints
        .service(
            web::scope("/vault")
                .route("/deposit", web::post().to(handlers::deposit))
                .route("/withdraw", web::post().to(handlers::withdraw))
                .route(
                    "/withdrawal-availability",
                    web::get().to(handlers::withdrawal_availability),
                )
                .route("/position/{user}", web::get().to(handlers::get_position))
                .route("/tvl", web::get().to(handlers::get_tvl))
                .route("/tokens", web::get().to(handlers::get_tokens))

                // Mint simulated tokens (development only)
                .route("/faucet", web::post().to(handlers::faucet)),
        )

        // Strategy endpoints; /analytics must precede /{asset}
        .service(
            web::scope("/strategy")
                .route("/analytics", web::get().to(handlers::get_analytics))
                .route("/{asset}", web::get().to(handlers::get_strategy)),
        )

        // Owner operations
        .service(
            web::scope("/admin")
                .route("/strategy", web::post().to(handlers::set_strategy))
                .route("/price-feed", web::post().to(handlers::set_price_feed))
                .route(
                    "/emergency-withdraw",
                    web::post().to(handlers::emergency_withdraw),
                )
                .route("/pause", web::post().to(handlers::set_paused))
                .route("/market", web::post().to(handlers::market_control)),
        )

        // Monitoring endpoints
        .service(
            web::scope("/monitor")
                .route("/alerts", web::get().to(handlers::get_alerts))
                .route("/tvl-history", web::get().to(handlers::get_tvl_history))
                .route("/events", web::get().to(handlers::get_events))
                .route("/reconciliation", web::get().to(handlers::reconcile)),
        );
}
