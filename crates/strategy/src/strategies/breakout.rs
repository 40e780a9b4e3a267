use std::sync::Arc;

use async_trait::async_trait;

use common::error::EngineError;
use common::models::{Candle, Direction, StrategySignal};
use market_data::traits::TradingApi;

use crate::traits::Strategy;

const PERIOD: usize = 20;
const VOLUME_CONFIRM: f64 = 1.5;

/// Range breakout over the prior N daily bars, confirmed by volume.
pub struct BreakoutStrategy {
    api: Arc<dyn TradingApi>,
}

impl BreakoutStrategy {
    pub fn new(api: Arc<dyn TradingApi>) -> Self {
        Self { api }
    }
}

fn evaluate(candles: &[Candle]) -> StrategySignal {
    if candles.len() < PERIOD + 1 {
        return StrategySignal::none();
    }
    let last = candles[candles.len() - 1];
    let prior = &candles[candles.len() - 1 - PERIOD..candles.len() - 1];

    let range_high = prior.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let range_low = prior.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let avg_volume =
        prior.iter().map(|c| c.volume as f64).sum::<f64>() / prior.len() as f64;
    let volume_confirmed = avg_volume > 0.0 && last.volume as f64 >= avg_volume * VOLUME_CONFIRM;

    if last.close > range_high {
        let margin = (last.close - range_high) / range_high;
        StrategySignal {
            direction: Direction::Buy,
            strength: (margin * 200.0).clamp(1.0, 10.0),
            confidence: if volume_confirmed { 0.8 } else { 0.55 },
        }
    } else if last.close < range_low {
        let margin = (range_low - last.close) / range_low;
        StrategySignal {
            direction: Direction::Sell,
            strength: (margin * 200.0).clamp(1.0, 10.0),
            confidence: if volume_confirmed { 0.8 } else { 0.55 },
        }
    } else {
        StrategySignal::none()
    }
}

#[async_trait]
impl Strategy for BreakoutStrategy {
    fn name(&self) -> &'static str {
        "breakout"
    }

    async fn get_signal(&self, symbol: &str) -> Result<StrategySignal, EngineError> {
        let candles = self.api.get_daily_candles(symbol, PERIOD + 1).await?;
        Ok(evaluate(&candles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranging(count: usize) -> Vec<Candle> {
        (0..count)
            .map(|_| Candle {
                open: 100.0,
                high: 102.0,
                low: 98.0,
                close: 100.0,
                volume: 1000,
            })
            .collect()
    }

    #[test]
    fn close_above_range_high_is_a_buy() {
        let mut candles = ranging(PERIOD);
        candles.push(Candle {
            open: 101.0,
            high: 105.0,
            low: 101.0,
            close: 104.0,
            volume: 2000,
        });
        let signal = evaluate(&candles);
        assert_eq!(signal.direction, Direction::Buy);
        assert!(signal.confidence > 0.7, "volume spike should confirm");
    }

    #[test]
    fn close_below_range_low_is_a_sell() {
        let mut candles = ranging(PERIOD);
        candles.push(Candle {
            open: 99.0,
            high: 99.0,
            low: 95.0,
            close: 96.0,
            volume: 900,
        });
        let signal = evaluate(&candles);
        assert_eq!(signal.direction, Direction::Sell);
        assert!(signal.confidence < 0.7, "no volume confirmation");
    }

    #[test]
    fn inside_the_range_is_neutral() {
        let mut candles = ranging(PERIOD);
        candles.push(Candle {
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 1000,
        });
        assert_eq!(evaluate(&candles).direction, Direction::None);
    }
}
