use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use tokio::sync::{broadcast, watch};
use tokio::time;
use tracing::{debug, info, warn};

use common::alerts::Notifier;
use common::config::{RiskParams, SupervisorParams, TradingParams};
use common::market_hours::is_market_open;
use common::models::{
    ExitReason, OrderRequest, OrderType, Position, Side, TradeRecord,
};
use market_data::services::market_gateway::MarketEvent;
use market_data::traits::{FeedChannel, MarketFeed, TradingApi};
use storage::Persistence;

use crate::indicators::{momentum, volatility, volume_surge};
use crate::ledger::{PositionLedger, exit_reason, is_emergency};
use crate::sizing;
use crate::window::SignalWindowStore;

const STRATEGY_TAG: &str = "scalping";

/// Everything the engine borrows from the supervisor. Cloned per engine
/// incarnation so a rescan can restart the engine on a fresh universe.
#[derive(Clone)]
pub struct EngineDeps {
    pub api: Arc<dyn TradingApi>,
    pub feed: Arc<dyn MarketFeed>,
    pub ledger: Arc<PositionLedger>,
    pub persistence: Arc<Persistence>,
    pub notifier: Notifier,
    pub trading: TradingParams,
    pub risk: RiskParams,
    pub supervisor: SupervisorParams,
}

/// Entry decision from the three window indicators. All thresholds must
/// hold and the side follows the momentum sign.
pub fn entry_side(
    volatility: f64,
    surge: f64,
    momentum: f64,
    params: &TradingParams,
) -> Option<Side> {
    if volatility < params.price_change_threshold {
        return None;
    }
    if surge < params.volume_multiplier {
        return None;
    }
    if momentum.abs() < params.price_change_threshold {
        return None;
    }
    Some(if momentum > 0.0 { Side::Buy } else { Side::Sell })
}

/// The live signal engine: consumes the market-event channel into the
/// window store and runs the entry/exit/emergency checks over its symbol
/// set every cycle while the market is open.
pub struct ScalpEngine {
    deps: EngineDeps,
    symbols: Vec<String>,
    windows: SignalWindowStore,
    market_rx: Option<broadcast::Receiver<Arc<MarketEvent>>>,
}

impl ScalpEngine {
    pub fn new(
        deps: EngineDeps,
        symbols: Vec<String>,
        market_rx: broadcast::Receiver<Arc<MarketEvent>>,
    ) -> Self {
        let capacity = deps.trading.tick_window;
        Self {
            deps,
            symbols,
            windows: SignalWindowStore::new(capacity),
            market_rx: Some(market_rx),
        }
    }

    pub async fn run(mut self, mut cancel: watch::Receiver<bool>) {
        let Some(mut market_rx) = self.market_rx.take() else {
            return;
        };
        for symbol in &self.symbols {
            self.windows.track(symbol);
            if let Err(e) = self.deps.feed.subscribe_price(symbol).await {
                warn!("price subscription failed for {symbol}: {e}");
            }
            if let Err(e) = self.deps.feed.subscribe_orderbook(symbol).await {
                warn!("orderbook subscription failed for {symbol}: {e}");
            }
        }
        info!("signal engine running over {} symbols", self.symbols.len());

        let mut ticker =
            time::interval(Duration::from_secs(self.deps.supervisor.engine_interval_secs));
        loop {
            tokio::select! {
                _ = cancel.changed() => break,
                event = market_rx.recv() => match event {
                    Ok(event) => self.apply_event(&event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("signal engine lagged behind the feed by {n} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = ticker.tick() => {
                    if is_market_open(Local::now().naive_local(), &self.deps.trading) {
                        self.cycle().await;
                    }
                }
            }
        }

        // cooperative drain: release remote subscriptions before stopping
        for symbol in &self.symbols {
            let _ = self.deps.feed.unsubscribe(symbol, FeedChannel::Price).await;
            let _ = self.deps.feed.unsubscribe(symbol, FeedChannel::Orderbook).await;
            self.windows.untrack(symbol);
        }
        info!("signal engine stopped");
    }

    fn apply_event(&mut self, event: &MarketEvent) {
        match event {
            MarketEvent::Tick { symbol, tick } => {
                self.windows.record_tick(symbol, tick.clone());
            }
            MarketEvent::Orderbook { symbol, book } => {
                self.windows.record_book(symbol, book.clone());
            }
        }
    }

    async fn cycle(&mut self) {
        let symbols = self.symbols.clone();
        for symbol in &symbols {
            self.analyze(symbol).await;
        }
        self.monitor_positions().await;
    }

    /// Entry and exit checks for one symbol against its current window.
    async fn analyze(&mut self, symbol: &str) {
        if !self.windows.is_full(symbol) {
            return;
        }
        let ticks = self.windows.ticks(symbol);
        let Some(price) = ticks.last().map(|t| t.price) else {
            return;
        };

        let vol = volatility(&ticks);
        let surge = volume_surge(&ticks, self.deps.trading.tick_window);
        let mom = momentum(&ticks);

        if let Some(side) = entry_side(vol, surge, mom, &self.deps.trading) {
            if !self.deps.ledger.has(symbol).await {
                self.enter(symbol, side, price, mom, surge).await;
            }
        }

        if let Some(position) = self.deps.ledger.get(symbol).await {
            if let Some(reason) = exit_reason(&position, price, Utc::now(), &self.deps.trading) {
                self.exit(&position, price, reason).await;
            }
        }
    }

    async fn enter(&self, symbol: &str, side: Side, price: f64, mom: f64, surge: f64) {
        let Some(sized) = sizing::size_order(self.deps.trading.position_size, price, &self.deps.risk)
        else {
            debug!("{symbol}: no affordable quantity at {price}");
            return;
        };
        let order = OrderRequest {
            symbol: symbol.to_string(),
            side,
            quantity: sized.quantity,
            price: None,
            order_type: OrderType::Market,
            strategy_tag: STRATEGY_TAG.to_string(),
            reason_tag: format!("momentum_{mom:.4}_volume_{surge:.2}"),
        };

        match time::timeout(
            self.deps.supervisor.order_timeout(),
            self.deps.api.place_order(&order),
        )
        .await
        {
            Ok(Ok(ack)) => {
                let opened = self
                    .deps
                    .ledger
                    .try_open(Position {
                        symbol: symbol.to_string(),
                        side,
                        entry_price: price,
                        entry_time: Utc::now(),
                        quantity: sized.quantity,
                    })
                    .await;
                if !opened {
                    warn!("{symbol}: entry raced an existing position, ledger unchanged");
                    return;
                }
                info!(
                    "entered {} {symbol} x{} at {price}",
                    side.as_str(),
                    sized.quantity
                );
                self.deps.notifier.trade(&order, &ack.order_id);
                self.record_trade(&order, price).await;
            }
            Ok(Err(e)) => warn!("{symbol}: entry order failed: {e}"),
            Err(_) => warn!("{symbol}: entry order timed out"),
        }
    }

    async fn exit(&self, position: &Position, price: f64, reason: ExitReason) {
        let order = OrderRequest {
            symbol: position.symbol.clone(),
            side: position.side.opposite(),
            quantity: position.quantity,
            price: None,
            order_type: OrderType::Market,
            strategy_tag: STRATEGY_TAG.to_string(),
            reason_tag: reason.as_str().to_string(),
        };

        match time::timeout(
            self.deps.supervisor.order_timeout(),
            self.deps.api.place_order(&order),
        )
        .await
        {
            Ok(Ok(_ack)) => {
                self.deps.ledger.close(&position.symbol).await;
                let pnl = position.pnl_rate(price);
                info!(
                    "exited {} at {price}, reason {}, pnl {:.2}%",
                    position.symbol,
                    reason.as_str(),
                    pnl * 100.0
                );
                self.deps.notifier.exit(&position.symbol, reason, pnl);
                self.record_trade(&order, price).await;
            }
            Ok(Err(e)) => warn!("{}: exit order failed: {e}", position.symbol),
            Err(_) => warn!("{}: exit order timed out", position.symbol),
        }
    }

    /// Emergency pass: any open position beyond the emergency threshold
    /// is forced flat regardless of the regular exit conditions.
    async fn monitor_positions(&mut self) {
        for position in self.deps.ledger.open_positions().await {
            let Some(price) = self.windows.last_price(&position.symbol) else {
                continue;
            };
            if is_emergency(&position, price, self.deps.trading.emergency_threshold) {
                let pnl = position.pnl_rate(price);
                let surge = volume_surge(
                    &self.windows.ticks(&position.symbol),
                    self.deps.trading.tick_window,
                );
                self.exit(&position, price, ExitReason::Emergency).await;
                self.deps.notifier.large_movement(&position.symbol, pnl, surge);
            }
        }
    }

    /// Market orders carry no limit price, so the observed price at
    /// decision time is what the audit trail records.
    async fn record_trade(&self, order: &OrderRequest, price: f64) {
        let record = TradeRecord {
            symbol: order.symbol.clone(),
            side: order.side.as_str().to_string(),
            price,
            quantity: order.quantity,
            strategy: order.strategy_tag.clone(),
            reason: order.reason_tag.clone(),
        };
        if let Err(e) = self.deps.persistence.save_trade(&record).await {
            warn!("trade record not saved: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use common::error::EngineError;
    use common::models::{
        AccountBalance, Candle, OrderAck, SymbolInfo, Tick,
    };

    #[test]
    fn entry_requires_all_three_thresholds() {
        let params = TradingParams::default();

        assert_eq!(entry_side(0.003, 2.0, 0.01, &params), Some(Side::Buy));
        assert_eq!(entry_side(0.003, 2.0, -0.01, &params), Some(Side::Sell));

        // each threshold individually gates the entry
        assert_eq!(entry_side(0.001, 2.0, 0.01, &params), None);
        assert_eq!(entry_side(0.003, 1.0, 0.01, &params), None);
        assert_eq!(entry_side(0.003, 2.0, 0.001, &params), None);
    }

    struct CountingApi {
        orders: AtomicU32,
    }

    #[async_trait]
    impl TradingApi for CountingApi {
        async fn get_account_balance(&self) -> Result<AccountBalance, EngineError> {
            Ok(AccountBalance::default())
        }
        async fn place_order(&self, _order: &OrderRequest) -> Result<OrderAck, EngineError> {
            self.orders.fetch_add(1, Ordering::SeqCst);
            Ok(OrderAck {
                order_id: "1".to_string(),
            })
        }
        async fn get_symbol_info(&self, _symbol: &str) -> Result<SymbolInfo, EngineError> {
            Err(EngineError::Transport("unused".to_string()))
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

    async fn engine_with(api: Arc<CountingApi>) -> ScalpEngine {
        let (notifier, _rx) = Notifier::channel(64);
        let (_tx, market_rx) = broadcast::channel(64);
        let deps = EngineDeps {
            api: api.clone(),
            feed: Arc::new(NullFeed),
            ledger: Arc::new(PositionLedger::new()),
            persistence: Arc::new(Persistence::in_memory().await.unwrap()),
            notifier,
            trading: TradingParams::default(),
            risk: RiskParams::default(),
            supervisor: SupervisorParams::default(),
        };
        ScalpEngine::new(deps, vec!["005930".to_string()], market_rx)
    }

    /// A window that satisfies every entry threshold: rising prices and a
    /// volume pickup over the last five ticks.
    fn surging_window() -> Vec<Tick> {
        (0..10)
            .map(|i| {
                Tick::new(
                    100.0 + i as f64 * 0.5,
                    if i >= 5 { 300 } else { 100 },
                    Utc::now(),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn analyze_opens_at_most_one_position() {
        let api = Arc::new(CountingApi {
            orders: AtomicU32::new(0),
        });
        let mut engine = engine_with(api.clone()).await;

        engine.windows.track("005930");
        for tick in surging_window() {
            engine.windows.record_tick("005930", tick);
        }

        engine.analyze("005930").await;
        assert!(engine.deps.ledger.has("005930").await);
        assert_eq!(api.orders.load(Ordering::SeqCst), 1);

        // the signal still fires, but the open position blocks re-entry
        engine.analyze("005930").await;
        assert_eq!(api.orders.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn partial_window_never_trades() {
        let api = Arc::new(CountingApi {
            orders: AtomicU32::new(0),
        });
        let mut engine = engine_with(api.clone()).await;

        engine.windows.track("005930");
        for tick in surging_window().into_iter().take(9) {
            engine.windows.record_tick("005930", tick);
        }

        engine.analyze("005930").await;
        assert_eq!(api.orders.load(Ordering::SeqCst), 0);
        assert!(!engine.deps.ledger.has("005930").await);
    }
}
