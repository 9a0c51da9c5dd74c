//! # Balance Tracker Service
//!
//! The BalanceTracker checks that the share ledger and the strategies
//! agree, and keeps a rolling history of Total Value Locked.
//!
//! ## Responsibilities
//!
//! - Reconcile share value against strategy value
//! - Detect adapters whose live market balance fell below what they recorded
//! - Check that holder balances add up to the share supply
//! - Record TVL snapshots
//!
//! ## Reconciliation Flow
//!
//! ```text
//! Every RECONCILIATION_INTERVAL seconds:
//! 1. Value every holder's shares at the current price per share
//!               ↓
//! 2. Value every strategy balance at the oracle price
//!               ↓
//! 3. Compare the two totals (tolerance in basis points)
//!               ↓
//! 4. Compare each adapter's recorded balance with the live market balance
//!               ↓
//! 5. Raise alerts for anything out of line, store a TVL snapshot
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use briq_vault::math::{mul_div, Rounding, WAD};
use briq_vault::{StrategyKind, VaultError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::interval;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::utils::{format_usd, ratio_bps};

use super::vault_manager::ManagerError;
use super::vault_monitor::{AlertLog, AlertSeverity};
use super::VaultManager;

/// 24 hours of snapshots at the default 5 minute interval.
const SNAPSHOT_CAPACITY: usize = 288;

/// Point-in-time Total Value Locked.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TvlSnapshot {
    pub id: Uuid,
    pub total_value_usd: String,
    pub formatted_tvl: String,
    pub total_shares: String,
    pub price_per_share: String,
    pub timestamp: DateTime<Utc>,
}

/// An adapter holding less in its market than it last recorded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionShortfall {
    pub strategy: String,
    pub symbol: String,
    pub recorded: String,
    pub live: String,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    /// Σ holder shares × price per share.
    pub share_value_usd: String,
    /// Σ strategy balances × oracle price.
    pub strategy_value_usd: String,
    pub drift_bps: u32,
    /// Σ holder balances equals the share supply.
    pub supply_consistent: bool,
    pub within_tolerance: bool,
    pub shortfalls: Vec<PositionShortfall>,
    pub timestamp: DateTime<Utc>,
}

/// The Balance Tracker service.
///
/// ## Usage
///
/// ```rust,ignore
/// let tracker = BalanceTracker::new(manager, alerts, config);
///
/// // Start background reconciliation
/// tokio::spawn(async move {
///     tracker.start_reconciliation_loop().await;
/// });
///
/// // Or reconcile on demand
/// let report = tracker.reconcile()?;
/// ```
#[derive(Clone)]
pub struct BalanceTracker {
    manager: VaultManager,
    alerts: AlertLog,
    config: AppConfig,
    snapshots: Arc<Mutex<VecDeque<TvlSnapshot>>>,
}

impl BalanceTracker {
    pub fn new(manager: VaultManager, alerts: AlertLog, config: AppConfig) -> Self {
        Self {
            manager,
            alerts,
            config,
            snapshots: Arc::new(Mutex::new(VecDeque::with_capacity(SNAPSHOT_CAPACITY))),
        }
    }

    /// Start the background reconciliation loop.
    ///
    /// ## Configuration
    ///
    /// The interval is controlled by `config.reconciliation_interval`
    /// (default: 300 seconds = 5 minutes).
    pub async fn start_reconciliation_loop(&self) {
        info!(
            "Starting balance reconciliation loop (interval: {}s)",
            self.config.reconciliation_interval
        );

        let mut ticker = interval(Duration::from_secs(self.config.reconciliation_interval.max(1)));

        loop {
            ticker.tick().await;

            match self.reconcile() {
                Ok(report) if report.within_tolerance && report.shortfalls.is_empty() => {
                    debug!("Reconciliation clean ({} bps drift)", report.drift_bps);
                }
                Ok(report) => {
                    info!(
                        "Reconciliation found issues: {} bps drift, {} shortfalls",
                        report.drift_bps,
                        report.shortfalls.len()
                    );
                }
                Err(e) => error!("Reconciliation failed: {}", e),
            }

            if let Err(e) = self.record_snapshot() {
                error!("TVL snapshot failed: {}", e);
            }
        }
    }

    /// Run one reconciliation pass and raise alerts for what it finds.
    pub fn reconcile(&self) -> Result<ReconciliationReport, ManagerError> {
        let sim = self.manager.deployment();

        // ===== STEP 1: Share side =====
        let price_per_share = sim.vault.price_per_share()?;
        let holders = sim.shares.holders();
        let mut held: u128 = 0;
        let mut share_value: u128 = 0;
        for (_, balance) in &holders {
            held = held.checked_add(*balance).ok_or(VaultError::Overflow)?;
            let value = mul_div(*balance, price_per_share, WAD, Rounding::Floor)?;
            share_value = share_value.checked_add(value).ok_or(VaultError::Overflow)?;
        }
        let supply_consistent = held == sim.shares.total_supply();

        // ===== STEP 2: Strategy side =====
        let strategy_value = sim.vault.get_total_vault_value_in_usd()?;
        let drift_bps = ratio_bps(share_value.abs_diff(strategy_value), strategy_value);
        let within_tolerance = drift_bps <= self.config.reconciliation_tolerance_bps;

        // ===== STEP 3: Adapter bookkeeping =====
        let mut shortfalls = Vec::new();
        for listed in self.manager.supported_assets() {
            let asset = listed.listing.address;
            for kind in StrategyKind::ALL {
                let recorded = match kind {
                    StrategyKind::Aave => sim.aave.position(&asset).current_balance,
                    StrategyKind::Compound => sim.compound.position(&asset).current_balance,
                };
                let live = match sim.coordinator.adapter(kind).balance_of(&asset) {
                    Ok(live) => live,
                    Err(e) => {
                        debug!("Cannot read {} balance of {}: {}", kind, listed.listing.symbol, e);
                        continue;
                    }
                };
                if live < recorded {
                    shortfalls.push(PositionShortfall {
                        strategy: kind.to_string(),
                        symbol: listed.listing.symbol.clone(),
                        recorded: recorded.to_string(),
                        live: live.to_string(),
                    });
                }
            }
        }

        // ===== STEP 4: Alerts =====
        if !supply_consistent {
            self.alerts.raise(
                AlertSeverity::Critical,
                "supply_mismatch",
                None,
                format!(
                    "Holder balances sum to {} but supply is {}",
                    held,
                    sim.shares.total_supply()
                ),
            );
        }
        if !within_tolerance {
            self.alerts.raise(
                AlertSeverity::Critical,
                "reconciliation_drift",
                None,
                format!(
                    "Share value {} vs strategy value {} ({} bps)",
                    format_usd(share_value),
                    format_usd(strategy_value),
                    drift_bps
                ),
            );
        }
        for shortfall in &shortfalls {
            self.alerts.raise(
                AlertSeverity::Warning,
                "position_shortfall",
                Some(&shortfall.symbol),
                format!(
                    "{} holds {} {} but recorded {}",
                    shortfall.strategy, shortfall.live, shortfall.symbol, shortfall.recorded
                ),
            );
        }

        Ok(ReconciliationReport {
            share_value_usd: share_value.to_string(),
            strategy_value_usd: strategy_value.to_string(),
            drift_bps,
            supply_consistent,
            within_tolerance,
            shortfalls,
            timestamp: Utc::now(),
        })
    }

    /// Store a TVL snapshot, dropping the oldest past capacity.
    pub fn record_snapshot(&self) -> Result<TvlSnapshot, ManagerError> {
        let sim = self.manager.deployment();
        let total = sim.vault.get_total_vault_value_in_usd()?;

        let snapshot = TvlSnapshot {
            id: Uuid::new_v4(),
            total_value_usd: total.to_string(),
            formatted_tvl: format_usd(total),
            total_shares: sim.shares.total_supply().to_string(),
            price_per_share: sim.vault.price_per_share()?.to_string(),
            timestamp: Utc::now(),
        };
        info!("TVL: {} | Shares: {}", snapshot.formatted_tvl, snapshot.total_shares);

        let mut snapshots = self.snapshots.lock().unwrap_or_else(|e| e.into_inner());
        if snapshots.len() == SNAPSHOT_CAPACITY {
            snapshots.pop_front();
        }
        snapshots.push_back(snapshot.clone());
        Ok(snapshot)
    }

    /// Most recent snapshots, newest first.
    pub fn tvl_history(&self, limit: usize) -> Vec<TvlSnapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }
}
