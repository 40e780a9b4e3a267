use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, NaiveDate};
use tokio::sync::{RwLock, broadcast};
use tokio::time;
use tracing::{info, warn};

use common::alerts::{AlertLevel, Notifier};
use common::config::{Settings, SupervisorParams};
use common::error::EngineError;
use common::market_hours::{is_market_open, is_past_close};
use common::tasks::TaskHandle;
use common::watchdog::Heartbeat;
use market_data::services::market_gateway::MarketEvent;
use market_data::traits::{MarketFeed, SymbolCatalog, TradingApi};
use storage::{Persistence, SystemStatus};
use strategy::engine::{EngineDeps, ScalpEngine};
use strategy::ledger::PositionLedger;
use strategy::registry;
use strategy::screener::UniverseScreener;
use strategy::traits::Strategy;

use crate::services::execution_service::ExecutionService;
use crate::watchdog;

/// Rescan trigger policy: no prior scan, the daily pre-open window with a
/// stale scan, or a scan older than the configured maximum age.
pub fn should_rescan(
    now: DateTime<Local>,
    last_scan: Option<DateTime<Local>>,
    params: &SupervisorParams,
) -> bool {
    let Some(last) = last_scan else {
        return true;
    };
    let t = now.time();
    if t >= params.rescan_window_start
        && t <= params.rescan_window_end
        && last.date_naive() < now.date_naive()
    {
        return true;
    }
    (now - last).num_seconds() > params.rescan_max_age_secs as i64
}

/// Owns the engine lifecycle: INITIALIZING -> RUNNING -> (STOPPED |
/// ERROR). Drives rescans, the buy sweep cadence, close-of-market
/// handling, the watchdog, and the shutdown sequence.
pub struct Supervisor {
    settings: Settings,
    api: Arc<dyn TradingApi>,
    feed: Arc<dyn MarketFeed>,
    persistence: Arc<Persistence>,
    notifier: Notifier,
    ledger: Arc<PositionLedger>,
    market_tx: broadcast::Sender<Arc<MarketEvent>>,
    heartbeat: Arc<Heartbeat>,
    strategies: Vec<Arc<dyn Strategy>>,
    screener: UniverseScreener,
    execution: ExecutionService,
    universe: Arc<RwLock<Vec<String>>>,
    last_scan: Option<DateTime<Local>>,
    last_sweep: Option<Instant>,
    close_handled_on: Option<NaiveDate>,
    engine_task: Option<TaskHandle>,
    watchdog_task: Option<TaskHandle>,
    shutdown_done: bool,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Settings,
        api: Arc<dyn TradingApi>,
        feed: Arc<dyn MarketFeed>,
        catalog: Arc<dyn SymbolCatalog>,
        ledger: Arc<PositionLedger>,
        persistence: Arc<Persistence>,
        notifier: Notifier,
        market_tx: broadcast::Sender<Arc<MarketEvent>>,
    ) -> Self {
        let strategies = registry::build(api.clone());
        let screener = UniverseScreener::new(
            catalog,
            strategies.clone(),
            settings.supervisor.clone(),
        );
        let execution = ExecutionService::new(
            api.clone(),
            ledger.clone(),
            persistence.clone(),
            notifier.clone(),
            settings.risk.clone(),
            settings.supervisor.clone(),
        );
        Self {
            settings,
            api,
            feed,
            persistence,
            notifier,
            ledger,
            market_tx,
            heartbeat: Arc::new(Heartbeat::new()),
            strategies,
            screener,
            execution,
            universe: Arc::new(RwLock::new(Vec::new())),
            last_scan: None,
            last_sweep: None,
            close_handled_on: None,
            engine_task: None,
            watchdog_task: None,
            shutdown_done: false,
        }
    }

    /// Startup: persist the state, sanity-check the account, bring up the
    /// live feed with bounded retries (absence of live data degrades, it
    /// does not abort), and start the watchdog.
    pub async fn initialize(&mut self) -> Result<(), EngineError> {
        info!("initializing trading engine");
        self.persistence
            .update_system_status(SystemStatus::Initializing, None)
            .await
            .map_err(|e| EngineError::Persistence(e.to_string()))?;

        match self.api.get_account_balance().await {
            Ok(balance) if balance.cash_balance > 0.0 => {
                info!("account deposit balance: {:.0}", balance.cash_balance);
            }
            Ok(balance) => {
                warn!("deposit balance is not positive: {:.0}", balance.cash_balance);
            }
            Err(e) => warn!("account balance check failed: {e}"),
        }

        let params = &self.settings.supervisor;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.feed.connect().await {
                Ok(()) => {
                    info!("live data feed connected");
                    break;
                }
                Err(e) if attempt < params.feed_connect_retries => {
                    warn!(
                        "feed connect failed ({attempt}/{}): {e}, retrying",
                        params.feed_connect_retries
                    );
                    time::sleep(Duration::from_secs(params.feed_retry_backoff_secs)).await;
                }
                Err(e) => {
                    warn!("feed connect failed after {attempt} attempts: {e}");
                    self.notifier.send(
                        AlertLevel::Warning,
                        "Live market data unavailable; running degraded until reconnect.",
                    );
                    break;
                }
            }
        }

        let heartbeat = self.heartbeat.clone();
        let watchdog_params = self.settings.watchdog.clone();
        let api = self.api.clone();
        let notifier = self.notifier.clone();
        self.watchdog_task = Some(TaskHandle::spawn("watchdog", move |cancel| {
            watchdog::run(heartbeat, watchdog_params, api, notifier, cancel)
        }));

        self.persistence
            .update_system_status(SystemStatus::Running, None)
            .await
            .map_err(|e| EngineError::Persistence(e.to_string()))?;
        self.notifier.startup();
        info!("trading engine initialized");
        Ok(())
    }

    pub async fn run(&mut self) {
        // initial scan before the first cycle
        self.rescan().await;

        let mut cycle = time::interval(Duration::from_secs(
            self.settings.supervisor.cycle_interval_secs,
        ));
        loop {
            cycle.tick().await;
            let now = Local::now();

            if should_rescan(now, self.last_scan, &self.settings.supervisor) {
                self.rescan().await;
            }

            if is_market_open(now.naive_local(), &self.settings.trading) {
                self.maybe_buy_sweep().await;
                if let Err(e) = self
                    .persistence
                    .update_system_status(SystemStatus::Running, None)
                    .await
                {
                    warn!("status update failed: {e}");
                }
            } else if is_past_close(now.naive_local(), &self.settings.trading) {
                self.handle_market_close(now.date_naive()).await;
            }

            // a completed iteration is the liveness signal
            self.heartbeat.beat();
        }
    }

    /// Stops the engine, re-screens, swaps the universe atomically, and
    /// restarts the engine. Any failure keeps the previous universe; the
    /// engine is always restarted.
    async fn rescan(&mut self) {
        info!("=== universe rescan started ===");
        if let Some(task) = self.engine_task.take() {
            task.shutdown(self.settings.supervisor.task_join_timeout()).await;
        }

        match self.screener.screen().await {
            Ok(universe) if !universe.is_empty() => {
                let old: Vec<String> = self.universe.read().await.clone();
                let added = universe.iter().filter(|s| !old.contains(s)).count();
                let removed = old.iter().filter(|s| !universe.contains(s)).count();
                info!(
                    "rescan complete: {} symbols ({added} added, {removed} removed)",
                    universe.len()
                );
                *self.universe.write().await = universe;
            }
            Ok(_) => {
                warn!("rescan produced no symbols, keeping the existing universe");
                self.notifier.send(
                    AlertLevel::Warning,
                    "Screening returned no symbols; keeping the existing universe.",
                );
            }
            Err(e) => {
                warn!("rescan failed: {e}, keeping the existing universe");
                self.notifier
                    .send(AlertLevel::Warning, format!("Universe rescan failed: {e}"));
            }
        }
        self.last_scan = Some(Local::now());
        self.spawn_engine().await;
    }

    async fn spawn_engine(&mut self) {
        let mut symbols: Vec<String> = self
            .universe
            .read()
            .await
            .iter()
            .take(self.settings.supervisor.active_subscriptions)
            .cloned()
            .collect();
        // symbols with open positions stay monitored across rescans so
        // every position is eventually reconciled
        for position in self.ledger.open_positions().await {
            if !symbols.contains(&position.symbol) {
                symbols.push(position.symbol);
            }
        }
        if symbols.is_empty() {
            warn!("no monitored symbols, signal engine idle until the next rescan");
            return;
        }
        let deps = EngineDeps {
            api: self.api.clone(),
            feed: self.feed.clone(),
            ledger: self.ledger.clone(),
            persistence: self.persistence.clone(),
            notifier: self.notifier.clone(),
            trading: self.settings.trading.clone(),
            risk: self.settings.risk.clone(),
            supervisor: self.settings.supervisor.clone(),
        };
        let engine = ScalpEngine::new(deps, symbols, self.market_tx.subscribe());
        self.engine_task = Some(TaskHandle::spawn("signal-engine", move |cancel| {
            engine.run(cancel)
        }));
    }

    async fn maybe_buy_sweep(&mut self) {
        let interval = Duration::from_secs(self.settings.supervisor.buy_sweep_interval_secs);
        let due = self
            .last_sweep
            .map(|at| at.elapsed() >= interval)
            .unwrap_or(true);
        if !due {
            return;
        }
        self.last_sweep = Some(Instant::now());

        let symbols: Vec<String> = self
            .universe
            .read()
            .await
            .iter()
            .take(self.settings.supervisor.sweep_depth)
            .cloned()
            .collect();
        if symbols.is_empty() {
            return;
        }
        self.execution.buy_sweep(&symbols, &self.strategies).await;
    }

    /// Once per trading day after the close: performance snapshot, database
    /// backup, daily report.
    async fn handle_market_close(&mut self, date: NaiveDate) {
        if self.close_handled_on == Some(date) {
            return;
        }
        self.close_handled_on = Some(date);
        info!("market closed, running end-of-day handling");

        match self.persistence.daily_summary(date).await {
            Ok(summary) => {
                if let Err(e) = self.persistence.save_performance(&summary).await {
                    warn!("performance snapshot not saved: {e}");
                }
                self.notifier.daily_report(&summary);
            }
            Err(e) => warn!("daily summary failed: {e}"),
        }

        if let Err(e) = self.persistence.backup(&self.settings.database.backup_dir).await {
            warn!("database backup failed: {e}");
        }
    }

    /// Idempotent: a second call is a no-op, so an error path that already
    /// shut down never produces duplicate notifications or position
    /// mutations. Notification failures are logged by the delivery
    /// service, never raised here.
    pub async fn shutdown(&mut self, error: Option<&str>) {
        if self.shutdown_done {
            info!("shutdown already completed");
            return;
        }
        self.shutdown_done = true;
        info!("shutdown started");

        let join = self.settings.supervisor.task_join_timeout();
        if let Some(task) = self.engine_task.take() {
            task.shutdown(join).await;
        }
        if let Some(task) = self.watchdog_task.take() {
            task.shutdown(join).await;
        }
        if let Err(e) = self.feed.close().await {
            warn!("feed close: {e}");
        }

        let status = match error {
            Some(msg) => {
                self.persistence
                    .update_system_status(SystemStatus::Error, Some(msg))
                    .await
            }
            None => {
                self.persistence
                    .update_system_status(SystemStatus::Stopped, None)
                    .await
            }
        };
        if let Err(e) = status {
            warn!("final status not persisted: {e}");
        }

        self.notifier.shutdown(error);
        info!("shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use async_trait::async_trait;
    use common::models::{
        AccountBalance, Candle, OrderAck, OrderRequest, Position, Side, SymbolInfo,
    };
    use market_data::traits::FeedChannel;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn rescan_when_no_prior_scan_exists() {
        let params = SupervisorParams::default();
        assert!(should_rescan(at(2026, 8, 5, 12, 0), None, &params));
    }

    #[test]
    fn rescan_in_preopen_window_only_for_stale_scans() {
        let params = SupervisorParams::default();
        let yesterday = Some(at(2026, 8, 4, 12, 0));
        let today_early = Some(at(2026, 8, 5, 7, 0));

        assert!(should_rescan(at(2026, 8, 5, 8, 35), yesterday, &params));
        // already scanned today: the window does not re-trigger
        assert!(!should_rescan(at(2026, 8, 5, 8, 35), today_early, &params));
        // outside the window a fresh-enough scan holds
        assert!(!should_rescan(at(2026, 8, 5, 9, 0), today_early, &params));
    }

    #[test]
    fn rescan_after_max_age() {
        let params = SupervisorParams::default();
        let six_hours_one_min_ago = Some(at(2026, 8, 5, 6, 0));
        assert!(should_rescan(at(2026, 8, 5, 12, 1), six_hours_one_min_ago, &params));
        assert!(!should_rescan(at(2026, 8, 5, 11, 59), six_hours_one_min_ago, &params));
    }

    struct NoopApi;

    #[async_trait]
    impl TradingApi for NoopApi {
        async fn get_account_balance(&self) -> Result<AccountBalance, EngineError> {
            Ok(AccountBalance::default())
        }
        async fn place_order(&self, _order: &OrderRequest) -> Result<OrderAck, EngineError> {
            Ok(OrderAck {
                order_id: "1".to_string(),
            })
        }
        async fn get_symbol_info(&self, _symbol: &str) -> Result<SymbolInfo, EngineError> {
            Err(EngineError::Transport("noop".to_string()))
        }
        async fn get_minute_candles(
            &self,
            _symbol: &str,
            _count: usize,
        ) -> Result<Vec<Candle>, EngineError> {
            Ok(Vec::new())
        }
        async fn get_daily_candles(
            &self,
            _symbol: &str,
            _count: usize,
        ) -> Result<Vec<Candle>, EngineError> {
            Ok(Vec::new())
        }
        async fn force_token_refresh(&self) -> Result<String, EngineError> {
            Ok("ok".to_string())
        }
    }

    struct NullFeed;

    #[async_trait]
    impl MarketFeed for NullFeed {
        async fn connect(&self) -> Result<(), EngineError> {
            Ok(())
        }
        fn is_connected(&self) -> bool {
            true
        }
        async fn subscribe_price(&self, _symbol: &str) -> Result<(), EngineError> {
            Ok(())
        }
        async fn subscribe_orderbook(&self, _symbol: &str) -> Result<(), EngineError> {
            Ok(())
        }
        async fn unsubscribe(
            &self,
            _symbol: &str,
            _channel: FeedChannel,
        ) -> Result<(), EngineError> {
            Ok(())
        }
        async fn close(&self) -> Result<(), EngineError> {
            Ok(())
        }
    }

    struct EmptyCatalog;

    #[async_trait]
    impl SymbolCatalog for EmptyCatalog {
        async fn get_tradable_symbols(
            &self,
            _market: market_data::traits::MarketType,
        ) -> Result<Vec<String>, EngineError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let (notifier, mut rx) = Notifier::channel(64);
        let api = Arc::new(NoopApi);
        let ledger = Arc::new(PositionLedger::new());
        ledger
            .try_open(Position {
                symbol: "005930".to_string(),
                side: Side::Buy,
                entry_price: 100.0,
                entry_time: chrono::Utc::now(),
                quantity: 1,
            })
            .await;
        let (market_tx, _) = broadcast::channel(16);

        let mut supervisor = Supervisor::new(
            Settings::default(),
            api,
            Arc::new(NullFeed),
            Arc::new(EmptyCatalog),
            ledger.clone(),
            Arc::new(Persistence::in_memory().await.unwrap()),
            notifier,
            market_tx,
        );

        supervisor.shutdown(None).await;
        supervisor.shutdown(None).await;
        supervisor.shutdown(Some("late error")).await;
        drop(supervisor);

        let mut shutdown_messages = 0;
        while let Some(note) = rx.recv().await {
            if note.text.contains("stopped normally") || note.text.contains("ABNORMAL") {
                shutdown_messages += 1;
            }
        }
        assert_eq!(shutdown_messages, 1, "only the first shutdown notifies");

        // no duplicate position mutation either
        assert_eq!(ledger.open_positions().await.len(), 1);
    }
}
