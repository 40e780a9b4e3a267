use std::sync::Arc;

use async_trait::async_trait;
use ta::Next;
use ta::indicators::{ExponentialMovingAverage, RelativeStrengthIndex};

use common::error::EngineError;
use common::models::{Candle, Direction, StrategySignal};
use market_data::traits::TradingApi;

use crate::traits::Strategy;

const RSI_PERIOD: usize = 14;
const MA_SHORT: usize = 5;
const MA_LONG: usize = 20;
const LOOKBACK: usize = 40;
const OVERSOLD: f64 = 30.0;
const OVERBOUGHT: f64 = 70.0;

/// RSI reversal with a moving-average trend filter on minute bars.
pub struct MomentumStrategy {
    api: Arc<dyn TradingApi>,
}

impl MomentumStrategy {
    pub fn new(api: Arc<dyn TradingApi>) -> Self {
        Self { api }
    }
}

fn evaluate(candles: &[Candle]) -> StrategySignal {
    if candles.len() < MA_LONG + 1 {
        return StrategySignal::none();
    }

    let mut rsi = RelativeStrengthIndex::new(RSI_PERIOD).unwrap();
    let mut ema_short = ExponentialMovingAverage::new(MA_SHORT).unwrap();
    let mut ema_long = ExponentialMovingAverage::new(MA_LONG).unwrap();

    let (mut last_rsi, mut short, mut long) = (50.0, 0.0, 0.0);
    for candle in candles {
        last_rsi = rsi.next(candle.close);
        short = ema_short.next(candle.close);
        long = ema_long.next(candle.close);
    }

    if last_rsi <= OVERSOLD {
        StrategySignal {
            direction: Direction::Buy,
            strength: ((50.0 - last_rsi) / 5.0).clamp(0.0, 10.0),
            confidence: if short > long { 0.8 } else { 0.6 },
        }
    } else if last_rsi >= OVERBOUGHT {
        StrategySignal {
            direction: Direction::Sell,
            strength: ((last_rsi - 50.0) / 5.0).clamp(0.0, 10.0),
            confidence: if short < long { 0.8 } else { 0.6 },
        }
    } else {
        StrategySignal::none()
    }
}

#[async_trait]
impl Strategy for MomentumStrategy {
    fn name(&self) -> &'static str {
        "momentum"
    }

    async fn get_signal(&self, symbol: &str) -> Result<StrategySignal, EngineError> {
        let candles = self.api.get_minute_candles(symbol, LOOKBACK).await?;
        Ok(evaluate(&candles))
    }
}
