use std::sync::Arc;

use async_trait::async_trait;

use common::error::EngineError;
use common::models::{Candle, Direction, StrategySignal};
use market_data::traits::TradingApi;

use crate::traits::Strategy;

const GAP_THRESHOLD: f64 = 0.01;
const LOOKBACK: usize = 5;

/// Opening gap against the previous close, traded only while the bar
/// holds the gap direction (gap-and-go, no fade chasing).
pub struct GapStrategy {
    api: Arc<dyn TradingApi>,
}

impl GapStrategy {
    pub fn new(api: Arc<dyn TradingApi>) -> Self {
        Self { api }
    }
}

fn evaluate(candles: &[Candle]) -> StrategySignal {
    if candles.len() < 2 {
        return StrategySignal::none();
    }
    let prev = candles[candles.len() - 2];
    let last = candles[candles.len() - 1];
    if prev.close <= 0.0 {
        return StrategySignal::none();
    }

    let gap = (last.open - prev.close) / prev.close;
    if gap >= GAP_THRESHOLD && last.close >= last.open {
        StrategySignal {
            direction: Direction::Buy,
            strength: (gap * 300.0).clamp(1.0, 10.0),
            confidence: 0.65,
        }
    } else if gap <= -GAP_THRESHOLD && last.close <= last.open {
        StrategySignal {
            direction: Direction::Sell,
            strength: (-gap * 300.0).clamp(1.0, 10.0),
            confidence: 0.65,
        }
    } else {
        StrategySignal::none()
    }
}

#[async_trait]
impl Strategy for GapStrategy {
    fn name(&self) -> &'static str {
        "gap"
    }

    async fn get_signal(&self, symbol: &str) -> Result<StrategySignal, EngineError> {
        let candles = self.api.get_daily_candles(symbol, LOOKBACK).await?;
        Ok(evaluate(&candles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open: f64, close: f64) -> Candle {
        Candle {
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume: 1000,
        }
    }

    #[test]
    fn held_gap_up_is_a_buy() {
        let candles = vec![candle(100.0, 100.0), candle(102.0, 103.0)];
        let signal = evaluate(&candles);
        assert_eq!(signal.direction, Direction::Buy);
    }

    #[test]
    fn faded_gap_up_is_neutral() {
        let candles = vec![candle(100.0, 100.0), candle(102.0, 100.5)];
        assert_eq!(evaluate(&candles).direction, Direction::None);
    }

    #[test]
    fn held_gap_down_is_a_sell() {
        let candles = vec![candle(100.0, 100.0), candle(98.0, 97.0)];
        assert_eq!(evaluate(&candles).direction, Direction::Sell);
    }

    #[test]
    fn small_gap_is_ignored() {
        let candles = vec![candle(100.0, 100.0), candle(100.5, 101.0)];
        assert_eq!(evaluate(&candles).direction, Direction::None);
    }
}
