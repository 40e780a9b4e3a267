use async_trait::async_trait;

use common::error::EngineError;
use common::models::StrategySignal;

/// The screening capability: produce a directional signal with a strength
/// and a confidence score for one symbol, asynchronously, within the
/// caller's time bound. Strategies that cannot form an opinion return
/// `StrategySignal::none()` rather than an error.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get_signal(&self, symbol: &str) -> Result<StrategySignal, EngineError>;
}
