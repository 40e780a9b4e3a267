use std::sync::Arc;

use async_trait::async_trait;

use common::error::EngineError;
use common::models::{Candle, Direction, StrategySignal};
use market_data::traits::TradingApi;

use crate::traits::Strategy;

const SMA_PERIOD: usize = 20;
const SPIKE_RATIO: f64 = 2.0;

/// Volume running well above its recent average, direction taken from the
/// accompanying price move.
pub struct VolumeSpikeStrategy {
    api: Arc<dyn TradingApi>,
}

impl VolumeSpikeStrategy {
    pub fn new(api: Arc<dyn TradingApi>) -> Self {
        Self { api }
    }
}

fn evaluate(candles: &[Candle]) -> StrategySignal {
    if candles.len() < SMA_PERIOD + 1 {
        return StrategySignal::none();
    }
    let last = candles[candles.len() - 1];
    let prev = candles[candles.len() - 2];
    let baseline = &candles[candles.len() - 1 - SMA_PERIOD..candles.len() - 1];
    let avg_volume =
        baseline.iter().map(|c| c.volume as f64).sum::<f64>() / baseline.len() as f64;
    if avg_volume <= 0.0 {
        return StrategySignal::none();
    }

    let ratio = last.volume as f64 / avg_volume;
    if ratio < SPIKE_RATIO || last.close == prev.close {
        return StrategySignal::none();
    }

    let direction = if last.close > prev.close {
        Direction::Buy
    } else {
        Direction::Sell
    };
    StrategySignal {
        direction,
        strength: (ratio * 2.0).min(10.0),
        confidence: 0.6,
    }
}

#[async_trait]
impl Strategy for VolumeSpikeStrategy {
    fn name(&self) -> &'static str {
        "volume"
    }

    async fn get_signal(&self, symbol: &str) -> Result<StrategySignal, EngineError> {
        let candles = self.api.get_minute_candles(symbol, SMA_PERIOD + 1).await?;
        Ok(evaluate(&candles))
    }
}
