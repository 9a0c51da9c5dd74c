//! # Vault Monitor Service
//!
//! The VaultMonitor continuously watches the strategies and price feeds
//! behind the vault.
//!
//! ## Responsibilities
//!
//! - Keep the simulated price feeds fresh (oracle heartbeat)
//! - Detect unavailable strategies and assets with no strategy left
//! - Detect prices that are stale or unreadable
//! - Detect placed funds that cannot be redeemed (low liquidity)
//! - Log a periodic strategy summary
//!
//! ## Monitoring Flow
//!
//! ```text
//! VaultMonitor (background task)
//!              │
//!              ├── Every HEALTH_CHECK_INTERVAL: heartbeat + checks
//!              │
//!              └── Every 5m: strategy/APY summary
//! ```
//!
//! Alerts are raised when a condition appears and again (as `info`) when
//! it clears, not on every tick.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use briq_vault::math::WAD;
use briq_vault::StrategyKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::utils::format_usd;

use super::VaultManager;

/// Severity of an [`Alert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// A monitoring alert.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: Uuid,
    pub severity: AlertSeverity,
    /// e.g. `strategy_unavailable`, `stale_price`, `low_liquidity`
    pub kind: String,
    /// Symbol of the affected asset, if any.
    pub asset: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Bounded in-memory alert list shared between the monitor, the
/// balance tracker and the API.
#[derive(Clone)]
pub struct AlertLog {
    alerts: Arc<Mutex<VecDeque<Alert>>>,
    capacity: usize,
}

impl AlertLog {
    pub const DEFAULT_CAPACITY: usize = 500;

    pub fn new(capacity: usize) -> Self {
        Self {
            alerts: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    /// Record an alert and log it by severity.
    pub fn raise(&self, severity: AlertSeverity, kind: &str, asset: Option<&str>, message: String) -> Alert {
        match severity {
            AlertSeverity::Info => info!("[{}] {}", kind, message),
            AlertSeverity::Warning => warn!("[{}] {}", kind, message),
            AlertSeverity::Critical => error!("[{}] {}", kind, message),
        }

        let alert = Alert {
            id: Uuid::new_v4(),
            severity,
            kind: kind.to_string(),
            asset: asset.map(str::to_string),
            message,
            timestamp: Utc::now(),
        };

        let mut alerts = self.alerts.lock().unwrap_or_else(|e| e.into_inner());
        if alerts.len() == self.capacity {
            alerts.pop_front();
        }
        alerts.push_back(alert.clone());
        alert
    }

    /// Most recent alerts, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Alert> {
        self.alerts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.alerts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

/// The Vault Monitor service.
///
/// ## Usage
///
/// ```rust,ignore
/// let monitor = VaultMonitor::new(manager, alerts, config);
///
/// // Start monitoring (runs forever)
/// tokio::spawn(async move {
///     monitor.start().await;
/// });
/// ```
#[derive(Clone)]
pub struct VaultMonitor {
    manager: VaultManager,
    alerts: AlertLog,
    config: AppConfig,

    /// Conditions currently alerted on, keyed `kind:subject`.
    active: Arc<Mutex<HashSet<String>>>,
}

impl VaultMonitor {
    pub fn new(manager: VaultManager, alerts: AlertLog, config: AppConfig) -> Self {
        Self {
            manager,
            alerts,
            config,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Start the monitoring loop.
    ///
    /// ## Checks Performed
    ///
    /// | Check | Interval | Description |
    /// |-------|----------|-------------|
    /// | Health | Configurable (default: 30s) | Heartbeat, strategies, prices, liquidity |
    /// | Summary | 5 minutes | Log strategy availability and APY |
    pub async fn start(&self) {
        info!("Starting Vault Monitor service");

        let mut health_ticker = interval(Duration::from_secs(self.config.health_check_interval.max(1)));
        let mut summary_ticker = interval(Duration::from_secs(300));

        loop {
            tokio::select! {
                _ = health_ticker.tick() => {
                    let raised = self.run_checks();
                    if raised > 0 {
                        debug!("Health check raised {} alerts", raised);
                    }
                }

                _ = summary_ticker.tick() => {
                    self.log_summary();
                }
            }
        }
    }

    /// One pass of every check. Returns the number of alerts raised.
    pub fn run_checks(&self) -> usize {
        let refreshed = self.manager.refresh_prices();
        debug!("Oracle heartbeat refreshed {} feeds", refreshed);

        self.check_strategies() + self.check_prices() + self.check_liquidity()
    }

    fn check_strategies(&self) -> usize {
        let coordinator = &self.manager.deployment().coordinator;
        let mut raised = 0;

        for listed in self.manager.supported_assets() {
            let symbol = listed.listing.symbol.as_str();
            let asset = listed.listing.address;
            let mut down = 0;

            for kind in StrategyKind::ALL {
                let available = coordinator.is_strategy_available(kind, &asset);
                if !available {
                    down += 1;
                }
                raised += self.transition(
                    &format!("strategy_unavailable:{}:{}", kind, symbol),
                    !available,
                    AlertSeverity::Warning,
                    "strategy_unavailable",
                    symbol,
                    format!("{} strategy unavailable for {}", kind, symbol),
                    format!("{} strategy available again for {}", kind, symbol),
                );
            }

            raised += self.transition(
                &format!("no_strategy:{}", symbol),
                down == StrategyKind::ALL.len(),
                AlertSeverity::Critical,
                "no_strategy",
                symbol,
                format!("No strategy available for {}: deposits will fail", symbol),
                format!("{} has a working strategy again", symbol),
            );
        }
        raised
    }

    fn check_prices(&self) -> usize {
        let unpriced = self.manager.unpriced_assets();
        let mut raised = 0;

        for listed in self.manager.supported_assets() {
            let symbol = listed.listing.symbol.as_str();
            let failure = unpriced
                .iter()
                .find(|(l, _)| l.listing.address == listed.listing.address)
                .map(|(_, e)| e.to_string());

            raised += self.transition(
                &format!("price_unavailable:{}", symbol),
                failure.is_some(),
                AlertSeverity::Warning,
                "price_unavailable",
                symbol,
                format!("Price of {} unavailable: {}", symbol, failure.unwrap_or_default()),
                format!("Price of {} is readable again", symbol),
            );
        }
        raised
    }

    /// Alert when placed funds cannot be fully redeemed and the
    /// redeemable part is worth less than the configured threshold.
    fn check_liquidity(&self) -> usize {
        let sim = self.manager.deployment();
        let price_feeds = sim.vault.price_feeds();
        let threshold = self.config.low_liquidity_threshold_usd.saturating_mul(WAD);
        let mut raised = 0;

        for listed in self.manager.supported_assets() {
            let symbol = listed.listing.symbol.as_str();
            let asset = listed.listing.address;

            let balance = match sim.coordinator.get_total_token_balance(&asset) {
                Ok(balance) => balance,
                Err(e) => {
                    debug!("Skipping liquidity check for {}: {}", symbol, e);
                    continue;
                }
            };
            let liquidity = sim.coordinator.get_available_liquidity(&asset).total;
            let liquidity_usd = match price_feeds.get_token_value_in_usd(&asset, liquidity) {
                Ok(usd) => usd,
                Err(_) => continue,
            };

            let low = balance > 0 && liquidity < balance && liquidity_usd < threshold;
            raised += self.transition(
                &format!("low_liquidity:{}", symbol),
                low,
                AlertSeverity::Warning,
                "low_liquidity",
                symbol,
                format!("Only {} of {} is redeemable", format_usd(liquidity_usd), symbol),
                format!("Liquidity for {} recovered", symbol),
            );
        }
        raised
    }

    /// Raise `raise_message` when `condition` turns on and
    /// `clear_message` when it turns off. Returns 1 if an alert was raised.
    #[allow(clippy::too_many_arguments)]
    fn transition(
        &self,
        key: &str,
        condition: bool,
        severity: AlertSeverity,
        kind: &str,
        symbol: &str,
        raise_message: String,
        clear_message: String,
    ) -> usize {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        match (condition, active.contains(key)) {
            (true, false) => {
                active.insert(key.to_string());
                self.alerts.raise(severity, kind, Some(symbol), raise_message);
                1
            }
            (false, true) => {
                active.remove(key);
                self.alerts
                    .raise(AlertSeverity::Info, &format!("{}_cleared", kind), Some(symbol), clear_message);
                0
            }
            _ => 0,
        }
    }

    fn log_summary(&self) {
        for row in self.manager.strategy_health() {
            info!(
                "{} via {}: {} ({} bps)",
                row.symbol,
                row.strategy,
                if row.available { "available" } else { "DOWN" },
                row.apy_bps
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DepositRequest, FaucetRequest, MarketAction, MarketControlRequest};
    use briq_vault::sim::ManualClock;

    const ADMIN: &str = "0x0000000000000000000000000000000000000001";

    fn monitor() -> (VaultMonitor, AlertLog, Arc<ManualClock>) {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let manager = VaultManager::with_clock(config.clone(), clock.clone()).unwrap();
        let alerts = AlertLog::default();
        (VaultMonitor::new(manager, alerts.clone(), config), alerts, clock)
    }

    fn control(monitor: &VaultMonitor, action: MarketAction, strategy: Option<&str>, asset: &str, amount: Option<&str>) {
        monitor
            .manager
            .market_control(MarketControlRequest {
                caller: ADMIN.to_string(),
                strategy: strategy.map(str::to_string),
                asset: asset.to_string(),
                action,
                amount: amount.map(str::to_string),
            })
            .unwrap();
    }

    #[test]
    fn test_healthy_deployment_raises_nothing() {
        let (monitor, alerts, _) = monitor();
        assert_eq!(monitor.run_checks(), 0);
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_strategy_outage_alerts_once_and_clears() {
        let (monitor, alerts, _) = monitor();
        control(&monitor, MarketAction::PauseAdapter, Some("compound"), "USDC", None);

        // Compound is down for every listed asset.
        assert_eq!(monitor.run_checks(), 3);
        assert_eq!(monitor.run_checks(), 0);

        control(&monitor, MarketAction::ResumeAdapter, Some("compound"), "USDC", None);
        assert_eq!(monitor.run_checks(), 0);

        let recent = alerts.recent(10);
        assert_eq!(recent.len(), 6);
        assert!(recent[..3].iter().all(|a| a.kind == "strategy_unavailable_cleared"));
        assert!(recent[3..].iter().all(|a| a.severity == AlertSeverity::Warning));
    }

    #[test]
    fn test_asset_with_no_strategy_is_critical() {
        let (monitor, alerts, _) = monitor();
        control(&monitor, MarketAction::Disconnect, Some("aave"), "DAI", None);
        control(&monitor, MarketAction::Pause, Some("compound"), "DAI", None);

        monitor.run_checks();
        let critical: Vec<Alert> = alerts
            .recent(50)
            .into_iter()
            .filter(|a| a.severity == AlertSeverity::Critical)
            .collect();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].asset.as_deref(), Some("DAI"));
    }

    #[test]
    fn test_heartbeat_skips_frozen_price() {
        let (monitor, alerts, clock) = monitor();
        control(&monitor, MarketAction::FreezePrice, None, "WETH", None);
        clock.advance(4_000);

        assert_eq!(monitor.run_checks(), 1);
        let alert = &alerts.recent(1)[0];
        assert_eq!(alert.kind, "price_unavailable");
        assert_eq!(alert.asset.as_deref(), Some("WETH"));
    }

    #[test]
    fn test_low_liquidity() {
        let (monitor, alerts, _) = monitor();
        let user = "0x00000000000000000000000000000000000003e9".to_string();
        monitor
            .manager
            .faucet(FaucetRequest {
                user: user.clone(),
                asset: "USDC".to_string(),
                amount: "2000".to_string(),
            })
            .unwrap();
        monitor
            .manager
            .deposit(DepositRequest {
                user,
                asset: "USDC".to_string(),
                amount: "2000".to_string(),
            })
            .unwrap();
        assert_eq!(monitor.run_checks(), 0);

        control(&monitor, MarketAction::CashCap, Some("aave"), "USDC", Some("500"));
        assert_eq!(monitor.run_checks(), 1);
        assert_eq!(alerts.recent(1)[0].message, "Only $500.00 of USDC is redeemable");
    }

    #[test]
    fn test_alert_log_is_bounded() {
        let log = AlertLog::new(2);
        for i in 0..3 {
            log.raise(AlertSeverity::Info, "test", None, format!("alert {}", i));
        }
        let recent = log.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "alert 2");
        assert_eq!(recent[1].message, "alert 1");
    }
}
