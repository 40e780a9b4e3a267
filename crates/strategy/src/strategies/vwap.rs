use std::sync::Arc;

use async_trait::async_trait;

use common::error::EngineError;
use common::models::{Candle, Direction, StrategySignal};
use market_data::traits::TradingApi;

use crate::traits::Strategy;

const BAND: f64 = 0.002;
const LOOKBACK: usize = 30;

/// Deviation from the volume-weighted average price of recent minute
/// bars, traded in the direction of the move.
pub struct VwapStrategy {
    api: Arc<dyn TradingApi>,
}

impl VwapStrategy {
    pub fn new(api: Arc<dyn TradingApi>) -> Self {
        Self { api }
    }
}

fn vwap(candles: &[Candle]) -> Option<f64> {
    let total_volume: f64 = candles.iter().map(|c| c.volume as f64).sum();
    if total_volume <= 0.0 {
        return None;
    }
    let weighted: f64 = candles
        .iter()
        .map(|c| (c.high + c.low + c.close) / 3.0 * c.volume as f64)
        .sum();
    Some(weighted / total_volume)
}

fn evaluate(candles: &[Candle]) -> StrategySignal {
    if candles.len() < 5 {
        return StrategySignal::none();
    }
    let Some(vwap) = vwap(candles) else {
        return StrategySignal::none();
    };
    let last = candles[candles.len() - 1];
    let prev = candles[candles.len() - 2];
    let deviation = (last.close - vwap) / vwap;

    if deviation >= BAND && last.close > prev.close {
        StrategySignal {
            direction: Direction::Buy,
            strength: (deviation * 1000.0).clamp(1.0, 10.0),
            confidence: 0.6,
        }
    } else if deviation <= -BAND && last.close < prev.close {
        StrategySignal {
            direction: Direction::Sell,
            strength: (-deviation * 1000.0).clamp(1.0, 10.0),
            confidence: 0.6,
        }
    } else {
        StrategySignal::none()
    }
}

#[async_trait]
impl Strategy for VwapStrategy {
    fn name(&self) -> &'static str {
        "vwap"
    }

    async fn get_signal(&self, symbol: &str) -> Result<StrategySignal, EngineError> {
        let candles = self.api.get_minute_candles(symbol, LOOKBACK).await?;
        Ok(evaluate(&candles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(close: f64, volume: i64) -> Candle {
        Candle {
            open: close,
            high: close,
            low: close,
            close,
            volume,
        }
    }

    #[test]
    fn rising_above_vwap_is_a_buy() {
        let mut candles = vec![candle(100.0, 1000); 10];
        candles.push(candle(100.3, 1000));
        candles.push(candle(100.6, 1000));
        let signal = evaluate(&candles);
        assert_eq!(signal.direction, Direction::Buy);
    }

    #[test]
    fn falling_below_vwap_is_a_sell() {
        let mut candles = vec![candle(100.0, 1000); 10];
        candles.push(candle(99.7, 1000));
        candles.push(candle(99.4, 1000));
        assert_eq!(evaluate(&candles).direction, Direction::Sell);
    }

    #[test]
    fn hugging_vwap_is_neutral() {
        let candles = vec![candle(100.0, 1000); 12];
        assert_eq!(evaluate(&candles).direction, Direction::None);
    }

    #[test]
    fn zero_volume_window_is_neutral() {
        let candles = vec![candle(100.0, 0); 12];
        assert_eq!(evaluate(&candles).direction, Direction::None);
    }
}
