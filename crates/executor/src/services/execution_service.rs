use std::sync::Arc;

use chrono::Utc;
use tokio::time;
use tracing::{debug, info, warn};

use common::alerts::{AlertLevel, Notifier};
use common::config::{RiskParams, SupervisorParams};
use common::models::{
    OrderRequest, OrderType, Position, Side, TradeRecord,
};
use market_data::traits::TradingApi;
use storage::Persistence;
use strategy::ledger::PositionLedger;
use strategy::scorer::{qualifies, score_symbol};
use strategy::sizing;
use strategy::traits::Strategy;

const STRATEGY_TAG: &str = "screener";

#[derive(Debug, Default, Clone, Copy)]
pub struct SweepReport {
    pub evaluated: usize,
    pub signals_found: usize,
    pub orders_placed: u32,
}

/// The universe-level buy path: periodic sweep over the monitored prefix,
/// sizing accepted signals against the deposit balance under the risk
/// caps.
pub struct ExecutionService {
    api: Arc<dyn TradingApi>,
    ledger: Arc<PositionLedger>,
    persistence: Arc<Persistence>,
    notifier: Notifier,
    risk: RiskParams,
    params: SupervisorParams,
}

impl ExecutionService {
    pub fn new(
        api: Arc<dyn TradingApi>,
        ledger: Arc<PositionLedger>,
        persistence: Arc<Persistence>,
        notifier: Notifier,
        risk: RiskParams,
        params: SupervisorParams,
    ) -> Self {
        Self {
            api,
            ledger,
            persistence,
            notifier,
            risk,
            params,
        }
    }

    pub async fn buy_sweep(
        &self,
        symbols: &[String],
        strategies: &[Arc<dyn Strategy>],
    ) -> SweepReport {
        let mut report = SweepReport::default();

        let balance = match time::timeout(
            self.params.order_timeout(),
            self.api.get_account_balance(),
        )
        .await
        {
            Ok(Ok(balance)) => balance,
            Ok(Err(e)) => {
                warn!("balance query failed, skipping buy sweep: {e}");
                return report;
            }
            Err(_) => {
                warn!("balance query timed out, skipping buy sweep");
                return report;
            }
        };

        if sizing::sweep_notional(balance.cash_balance, &self.risk).is_none() {
            warn!(
                "deposit balance not positive ({:.0}), skipping buy sweep",
                balance.cash_balance
            );
            self.notifier.send(
                AlertLevel::Warning,
                "Buy sweep skipped: deposit balance is not positive.",
            );
            return report;
        }

        info!(
            "buy sweep over {} symbols, deposit {:.0}",
            symbols.len(),
            balance.cash_balance
        );

        let mut available = balance.cash_balance;
        for (index, symbol) in symbols.iter().enumerate() {
            if report.orders_placed >= self.risk.max_orders_per_sweep {
                info!(
                    "order circuit breaker reached ({}), sweep stopped",
                    self.risk.max_orders_per_sweep
                );
                break;
            }
            if index > 0 {
                // pacing bounds outbound call concurrency
                time::sleep(self.params.sweep_pacing()).await;
            }
            report.evaluated += 1;

            if self.ledger.has(symbol).await {
                continue;
            }

            let score =
                score_symbol(strategies, symbol, self.params.strategy_timeout()).await;
            if !qualifies(&score) {
                continue;
            }
            report.signals_found += 1;
            info!(
                "buy signal on {symbol}: votes={}, score={:.1}",
                score.buy_votes, score.total_score
            );

            if let Some(value) =
                self.place_buy(symbol, available, score.total_score).await
            {
                report.orders_placed += 1;
                available -= value;
            }
        }

        info!(
            "buy sweep done: {} evaluated, {} signals, {} orders",
            report.evaluated, report.signals_found, report.orders_placed
        );
        report
    }

    /// Sizes and places one buy order; returns the committed notional.
    async fn place_buy(&self, symbol: &str, available: f64, score: f64) -> Option<f64> {
        let info = match time::timeout(
            self.params.order_timeout(),
            self.api.get_symbol_info(symbol),
        )
        .await
        {
            Ok(Ok(info)) => info,
            Ok(Err(e)) => {
                warn!("{symbol}: price lookup failed: {e}");
                return None;
            }
            Err(_) => {
                warn!("{symbol}: price lookup timed out");
                return None;
            }
        };
        if info.current_price <= 0.0 {
            return None;
        }

        // skip symbols that already ran away from the previous close
        if info.prev_close > 0.0 {
            let day_change = (info.current_price - info.prev_close) / info.prev_close * 100.0;
            if day_change > self.risk.surge_filter_pct {
                info!("{symbol}: up {day_change:.1}% on the day, buy skipped");
                return None;
            }
        }

        let notional = available * self.risk.deposit_ratio;
        let sized = sizing::size_order(notional, info.current_price, &self.risk)?;
        let value = sized.quantity as f64 * info.current_price;
        if value > available {
            debug!("{symbol}: sized order exceeds remaining budget");
            return None;
        }

        let order = OrderRequest {
            symbol: symbol.to_string(),
            side: Side::Buy,
            quantity: sized.quantity,
            price: Some(info.current_price),
            order_type: OrderType::Limit,
            strategy_tag: STRATEGY_TAG.to_string(),
            reason_tag: format!("strategy_signal_{score:.1}"),
        };

        match time::timeout(self.params.order_timeout(), self.api.place_order(&order)).await {
            Ok(Ok(ack)) => {
                let opened = self
                    .ledger
                    .try_open(Position {
                        symbol: symbol.to_string(),
                        side: Side::Buy,
                        entry_price: info.current_price,
                        entry_time: Utc::now(),
                        quantity: sized.quantity,
                    })
                    .await;
                if !opened {
                    warn!("{symbol}: sweep entry raced an existing position");
                    return None;
                }
                info!(
                    "buy order placed: {symbol} x{} at {:.0} (id {})",
                    sized.quantity, info.current_price, ack.order_id
                );
                self.notifier.trade(&order, &ack.order_id);
                let record = TradeRecord {
                    symbol: order.symbol.clone(),
                    side: order.side.as_str().to_string(),
                    price: info.current_price,
                    quantity: order.quantity,
                    strategy: order.strategy_tag.clone(),
                    reason: order.reason_tag.clone(),
                };
                if let Err(e) = self.persistence.save_trade(&record).await {
                    warn!("trade record not saved: {e}");
                }
                Some(value)
            }
            Ok(Err(e)) => {
                warn!("{symbol}: buy order failed: {e}");
                None
            }
            Err(_) => {
                warn!("{symbol}: buy order timed out");
                None
            }
        }
    }
}
