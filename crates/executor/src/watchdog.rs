use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tracing::{info, warn};

use common::alerts::{AlertLevel, Notifier};
use common::config::WatchdogParams;
use common::watchdog::Heartbeat;
use market_data::traits::TradingApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogAction {
    Healthy,
    Warned,
    Recovered,
}

/// One watchdog evaluation. Past the full interval it notifies, attempts
/// the automated recovery (forced token refresh), and resets the
/// heartbeat regardless of the recovery outcome so a single stall does
/// not alarm on every subsequent check.
pub async fn check_once(
    heartbeat: &Heartbeat,
    params: &WatchdogParams,
    api: &dyn TradingApi,
    notifier: &Notifier,
) -> WatchdogAction {
    let elapsed = heartbeat.elapsed();
    let minutes = elapsed.as_secs_f64() / 60.0;

    if elapsed >= params.interval() {
        notifier.send(
            AlertLevel::Error,
            format!(
                "System heartbeat timeout: no progress for {minutes:.1} minutes.\nAutomated recovery is in progress; check the system logs."
            ),
        );
        match api.force_token_refresh().await {
            Ok(message) => info!("recovery token refresh: {message}"),
            Err(e) => warn!("recovery token refresh failed: {e}"),
        }
        heartbeat.beat();
        info!("heartbeat reset after recovery attempt");
        return WatchdogAction::Recovered;
    }

    if elapsed >= params.warn_after() {
        warn!("heartbeat warning: {minutes:.1} minutes without progress");
        notifier.send(
            AlertLevel::Warning,
            format!(
                "System heartbeat warning: {minutes:.1} minutes without progress (timeout at {} minutes).",
                params.interval_secs / 60
            ),
        );
        return WatchdogAction::Warned;
    }

    WatchdogAction::Healthy
}

/// Background watchdog timer, independent of the main cycle.
pub async fn run(
    heartbeat: Arc<Heartbeat>,
    params: WatchdogParams,
    api: Arc<dyn TradingApi>,
    notifier: Notifier,
    mut cancel: watch::Receiver<bool>,
) {
    let mut ticker = time::interval(Duration::from_secs(params.check_every_secs));
    ticker.tick().await; // immediate first tick carries no signal
    loop {
        tokio::select! {
            _ = cancel.changed() => break,
            _ = ticker.tick() => {
                check_once(&heartbeat, &params, api.as_ref(), &notifier).await;
            }
        }
    }
    info!("watchdog stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use common::error::EngineError;
    use common::models::{
        AccountBalance, Candle, OrderAck, OrderRequest, SymbolInfo,
    };

    async fn advance_minutes(minutes: u64) {
        tokio::time::advance(Duration::from_secs(minutes * 60)).await;
    }

    mockall::mock! {
        Api {}

        #[async_trait]
        impl TradingApi for Api {
            async fn get_account_balance(&self) -> Result<AccountBalance, EngineError>;
            async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, EngineError>;
            async fn get_symbol_info(&self, symbol: &str) -> Result<SymbolInfo, EngineError>;
            async fn get_minute_candles(
                &self,
                symbol: &str,
                count: usize,
            ) -> Result<Vec<Candle>, EngineError>;
            async fn get_daily_candles(
                &self,
                symbol: &str,
                count: usize,
            ) -> Result<Vec<Candle>, EngineError>;
            async fn force_token_refresh(&self) -> Result<String, EngineError>;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn breach_recovers_once_and_resets_even_on_failure() {
        let heartbeat = Heartbeat::new();
        advance_minutes(31).await;
        let params = WatchdogParams::default();
        let (notifier, mut rx) = Notifier::channel(16);

        let mut api = MockApi::new();
        api.expect_force_token_refresh()
            .times(1)
            .returning(|| Err(EngineError::Transport("refresh failed".to_string())));

        let action = check_once(&heartbeat, &params, &api, &notifier).await;
        assert_eq!(action, WatchdogAction::Recovered);
        assert!(heartbeat.elapsed() < Duration::from_secs(60));

        // the reset prevents a second recovery on the next check
        let action = check_once(&heartbeat, &params, &api, &notifier).await;
        assert_eq!(action, WatchdogAction::Healthy);

        let alert = rx.recv().await.unwrap();
        assert_eq!(alert.level, AlertLevel::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn warning_at_eighty_percent_without_recovery() {
        let heartbeat = Heartbeat::new();
        advance_minutes(25).await;
        let params = WatchdogParams::default();
        let (notifier, mut rx) = Notifier::channel(16);

        let mut api = MockApi::new();
        api.expect_force_token_refresh().times(0);

        let action = check_once(&heartbeat, &params, &api, &notifier).await;
        assert_eq!(action, WatchdogAction::Warned);

        let alert = rx.recv().await.unwrap();
        assert_eq!(alert.level, AlertLevel::Warning);
    }

    #[tokio::test]
    async fn fresh_heartbeat_is_healthy() {
        let heartbeat = Heartbeat::new();
        let params = WatchdogParams::default();
        let (notifier, _rx) = Notifier::channel(16);
        let api = MockApi::new();

        let action = check_once(&heartbeat, &params, &api, &notifier).await;
        assert_eq!(action, WatchdogAction::Healthy);
    }
}
