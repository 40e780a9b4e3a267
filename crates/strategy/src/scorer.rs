use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::warn;

use common::models::ScreeningScore;

use crate::traits::Strategy;

/// A symbol qualifies for ranking only with this many BUY votes.
pub const MIN_BUY_VOTES: u32 = 2;

/// Invokes every registered strategy concurrently with a fixed per-call
/// timeout. A strategy that times out or errors contributes nothing for
/// this symbol; that is logged, never fatal to the pass.
pub async fn score_symbol(
    strategies: &[Arc<dyn Strategy>],
    symbol: &str,
    per_call_timeout: Duration,
) -> ScreeningScore {
    let calls = strategies.iter().map(|strategy| {
        let strategy = strategy.clone();
        let symbol = symbol.to_string();
        async move {
            let name = strategy.name();
            let outcome =
                tokio::time::timeout(per_call_timeout, strategy.get_signal(&symbol)).await;
            (name, outcome)
        }
    });

    let mut score = ScreeningScore::default();
    for (name, outcome) in join_all(calls).await {
        match outcome {
            Ok(Ok(signal)) => score.record(name, signal),
            Ok(Err(e)) => warn!("strategy {name} failed for {symbol}: {e}"),
            Err(_) => warn!("strategy {name} timed out for {symbol}"),
        }
    }
    score
}

pub fn qualifies(score: &ScreeningScore) -> bool {
    score.buy_votes >= MIN_BUY_VOTES
}
