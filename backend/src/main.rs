//! # Briq Vault Backend Service
//!
//! This is the main entry point for the backend service that operates
//! the Briq yield vault. It provides:
//!
//! - REST API for user interactions (deposit, withdraw, position queries)
//! - Owner operations (strategy assignment, price feeds, emergency withdrawal)
//! - Background services for monitoring and reconciliation
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        BACKEND SERVICE                           │
//! │                                                                  │
//! │  ┌─────────────────────────┐   ┌─────────────────────────────┐  │
//! │  │  REST API (Actix)       │   │   Background Services       │  │
//! │  │  /vault  /strategy      │   │  • Vault Monitor            │  │
//! │  │  /admin  /monitor       │   │  • Balance Tracker          │  │
//! │  └─────────────────────────┘   └─────────────────────────────┘  │
//! │               │                              │                   │
//! │  ┌────────────┴──────────────────────────────┴───────────────┐  │
//! │  │                    SERVICE LAYER                           │  │
//! │  │  ┌──────────────┐ ┌──────────────┐ ┌──────────────────┐   │  │
//! │  │  │VaultManager  │ │AlertLog      │ │BalanceTracker    │   │  │
//! │  │  └──────────────┘ └──────────────┘ └──────────────────┘   │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! │                          │                                       │
//! │  ┌───────────────────────┴───────────────────────────────────┐  │
//! │  │  briq-vault engine: BriqVault → StrategyCoordinator        │  │
//! │  │  → Aave / Compound adapters → simulated lending markets    │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! 1. Optionally create a `.env` (see `config` for every variable)
//! 2. Start the server: `cargo run -p briq-backend`
//! 3. Fund a user: `POST /vault/faucet`, then `POST /vault/deposit`

use std::io;
use std::str::FromStr;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod api;
mod config;
mod models;
mod services;
mod utils;

use config::AppConfig;
use services::{AlertLog, BalanceTracker, VaultManager, VaultMonitor};

/// Application state shared across all handlers.
///
/// Every service is a cheap clone over shared `Arc` state, so the
/// background tasks and the handlers see the same vault.
pub struct AppState {
    /// Vault operations and queries
    pub vault_manager: VaultManager,

    /// Reconciliation and TVL history
    pub balance_tracker: BalanceTracker,

    /// Alerts raised by the monitor and the tracker
    pub alerts: AlertLog,

    /// Application configuration
    pub config: AppConfig,
}

impl AppState {
    pub fn new(vault_manager: VaultManager, config: AppConfig) -> Self {
        let alerts = AlertLog::default();
        let balance_tracker = BalanceTracker::new(vault_manager.clone(), alerts.clone(), config.clone());
        Self {
            vault_manager,
            balance_tracker,
            alerts,
            config,
        }
    }
}

/// Main entry point for the backend service.
///
/// This function:
/// 1. Sets up logging
/// 2. Loads configuration from environment
/// 3. Deploys the vault engine and lists the seed assets
/// 4. Starts background monitoring services
/// 5. Launches the HTTP server
#[actix_web::main]
async fn main() -> io::Result<()> {
    // =========================================
    // STEP 1: Initialize Logging
    // =========================================
    let level = std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|value| Level::from_str(&value).ok())
        .unwrap_or(Level::DEBUG);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    info!("🚀 Starting Briq Vault Backend Service");

    // =========================================
    // STEP 2: Load Configuration
    // =========================================
    dotenvy::dotenv().ok(); // It's okay if .env doesn't exist

    let config = AppConfig::from_env()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

    info!("📋 Configuration loaded");
    info!("   Admin: {}", config.admin_address);
    info!("   Price staleness: {}s", config.price_staleness_seconds);
    info!("   Seed assets: {}", config.seed_assets.len());

    // =========================================
    // STEP 3: Deploy Vault Engine
    // =========================================
    let vault_manager = VaultManager::bootstrap(config.clone())
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    for listed in vault_manager.supported_assets() {
        info!(
            "   Listed {} at {} ({})",
            listed.listing.symbol,
            listed.listing.address,
            vault_manager
                .deployment()
                .coordinator
                .get_strategy_for_token(&listed.listing.address)
        );
    }

    info!("🏦 Vault engine deployed");

    // =========================================
    // STEP 4: Create Application State
    // =========================================
    let app_state = Arc::new(AppState::new(vault_manager, config.clone()));

    // =========================================
    // STEP 5: Start Background Services
    // =========================================
    let monitor = VaultMonitor::new(
        app_state.vault_manager.clone(),
        app_state.alerts.clone(),
        config.clone(),
    );
    tokio::spawn(async move {
        monitor.start().await;
    });

    info!("👁️  Vault monitor started");

    let tracker = app_state.balance_tracker.clone();
    tokio::spawn(async move {
        tracker.start_reconciliation_loop().await;
    });

    info!("📊 Balance tracker started");

    // =========================================
    // STEP 6: Start HTTP Server
    // =========================================
    let server_host = config.server_host.clone();
    let server_port = config.server_port;

    info!("🌐 Starting HTTP server on {}:{}", server_host, server_port);

    HttpServer::new(move || {
        App::new()
            // Attach shared application state
            .app_data(web::Data::new(app_state.clone()))

            // Add logging middleware
            .wrap(middleware::Logger::default())
            .wrap(Cors::permissive())

            // Configure API routes
            .configure(api::configure_routes)
    })
    .bind(format!("{}:{}", server_host, server_port))?
    .run()
    .await
}
