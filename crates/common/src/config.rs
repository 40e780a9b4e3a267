use std::env;
use std::path::Path;
use std::time::Duration;

use chrono::NaiveTime;
use serde::Deserialize;
use tracing::info;

use crate::error::EngineError;

/// Brokerage credentials. Secrets never live in the config file; they are
/// loaded from the environment (`.env` via dotenvy at startup).
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub base_url: String,
    pub ws_url: String,
    pub app_key: String,
    pub app_secret: String,
    pub account_no: String,
}

impl ApiCredentials {
    pub fn from_env() -> Result<Self, EngineError> {
        let var = |key: &str| {
            env::var(key).map_err(|_| EngineError::Config(format!("{key} not set")))
        };
        Ok(Self {
            base_url: var("KIS_BASE_URL")?,
            ws_url: env::var("KIS_WS_URL")
                .unwrap_or_else(|_| "ws://ops.koreainvestment.com:21000".to_string()),
            app_key: var("KIS_APP_KEY")?,
            app_secret: var("KIS_APP_SECRET")?,
            account_no: var("KIS_ACCOUNT_NO")?,
        })
    }

    /// Account numbers are 8-digit account + 2-digit product code.
    pub fn account_parts(&self) -> (&str, &str) {
        let split = self.account_no.len().min(8);
        self.account_no.split_at(split)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradingParams {
    pub market_open: NaiveTime,
    pub market_close: NaiveTime,
    pub tick_window: usize,
    pub volume_multiplier: f64,
    pub price_change_threshold: f64,
    pub hold_time_secs: u64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub emergency_threshold: f64,
    pub position_size: f64,
}

impl Default for TradingParams {
    fn default() -> Self {
        Self {
            market_open: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            market_close: NaiveTime::from_hms_opt(15, 30, 0).unwrap(),
            tick_window: 10,
            volume_multiplier: 1.5,
            price_change_threshold: 0.002,
            hold_time_secs: 60,
            stop_loss: 0.02,
            take_profit: 0.015,
            emergency_threshold: 0.05,
            position_size: 1_000_000.0,
        }
    }
}

impl TradingParams {
    pub fn hold_time(&self) -> Duration {
        Duration::from_secs(self.hold_time_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskParams {
    /// Share of the deposit balance a single buy sweep may deploy.
    pub deposit_ratio: f64,
    /// Hard ceiling on a single order's notional value.
    pub max_order_value: f64,
    /// Circuit breaker: orders allowed within one sweep.
    pub max_orders_per_sweep: u32,
    /// Skip buys for symbols already up this much (%) over the previous close.
    pub surge_filter_pct: f64,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            deposit_ratio: 0.5,
            max_order_value: 5_000_000.0,
            max_orders_per_sweep: 3,
            surge_filter_pct: 7.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorParams {
    pub cycle_interval_secs: u64,
    pub engine_interval_secs: u64,
    pub buy_sweep_interval_secs: u64,
    pub sweep_pacing_ms: u64,
    pub sweep_depth: usize,
    pub screen_depth: usize,
    pub universe_size: usize,
    pub active_subscriptions: usize,
    pub rescan_window_start: NaiveTime,
    pub rescan_window_end: NaiveTime,
    pub rescan_max_age_secs: u64,
    pub feed_connect_retries: u32,
    pub feed_retry_backoff_secs: u64,
    pub strategy_timeout_secs: u64,
    pub order_timeout_secs: u64,
    pub task_join_timeout_secs: u64,
}

impl Default for SupervisorParams {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 5,
            engine_interval_secs: 1,
            buy_sweep_interval_secs: 120,
            sweep_pacing_ms: 200,
            sweep_depth: 50,
            screen_depth: 200,
            universe_size: 100,
            active_subscriptions: 50,
            rescan_window_start: NaiveTime::from_hms_opt(8, 30, 0).unwrap(),
            rescan_window_end: NaiveTime::from_hms_opt(8, 40, 0).unwrap(),
            rescan_max_age_secs: 6 * 60 * 60,
            feed_connect_retries: 3,
            feed_retry_backoff_secs: 2,
            strategy_timeout_secs: 2,
            order_timeout_secs: 5,
            task_join_timeout_secs: 10,
        }
    }
}

impl SupervisorParams {
    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_secs(self.strategy_timeout_secs)
    }

    pub fn order_timeout(&self) -> Duration {
        Duration::from_secs(self.order_timeout_secs)
    }

    pub fn sweep_pacing(&self) -> Duration {
        Duration::from_millis(self.sweep_pacing_ms)
    }

    pub fn task_join_timeout(&self) -> Duration {
        Duration::from_secs(self.task_join_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchdogParams {
    pub interval_secs: u64,
    pub check_every_secs: u64,
    pub warn_ratio: f64,
}

impl Default for WatchdogParams {
    fn default() -> Self {
        Self {
            interval_secs: 30 * 60,
            check_every_secs: 60,
            warn_ratio: 0.8,
        }
    }
}

impl WatchdogParams {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn warn_after(&self) -> Duration {
        Duration::from_secs_f64(self.interval_secs as f64 * self.warn_ratio)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub backup_dir: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "trading_bot.db".to_string(),
            backup_dir: "backups".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub trading: TradingParams,
    pub risk: RiskParams,
    pub supervisor: SupervisorParams,
    pub watchdog: WatchdogParams,
    pub database: DatabaseConfig,
}

impl Settings {
    /// Loads settings from a TOML file when present, defaults otherwise.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        if !path.exists() {
            info!("no config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("read {}: {e}", path.display())))?;
        toml::from_str(&raw)
            .map_err(|e| EngineError::Config(format!("parse {}: {e}", path.display())))
    }
}
