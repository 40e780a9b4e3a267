use std::cmp::Ordering;
use std::sync::Arc;

use tokio::time;
use tracing::{info, warn};

use common::config::SupervisorParams;
use common::error::EngineError;
use common::models::ScreeningScore;
use market_data::traits::{MarketType, SymbolCatalog};

use crate::scorer::{qualifies, score_symbol};
use crate::traits::Strategy;

/// Ranks the tradable universe with the strategy registry and selects the
/// monitored set.
pub struct UniverseScreener {
    catalog: Arc<dyn SymbolCatalog>,
    strategies: Vec<Arc<dyn Strategy>>,
    params: SupervisorParams,
}

impl UniverseScreener {
    pub fn new(
        catalog: Arc<dyn SymbolCatalog>,
        strategies: Vec<Arc<dyn Strategy>>,
        params: SupervisorParams,
    ) -> Self {
        Self {
            catalog,
            strategies,
            params,
        }
    }

    /// One full screening pass. Returns up to `universe_size` symbols;
    /// empty only when the catalog itself came back empty, in which case
    /// the caller keeps its previous universe.
    pub async fn screen(&self) -> Result<Vec<String>, EngineError> {
        let all = match self.catalog.get_tradable_symbols(MarketType::All).await {
            Ok(symbols) => symbols,
            Err(e) => {
                warn!("tradable symbol lookup failed: {e}");
                Vec::new()
            }
        };
        if all.is_empty() {
            warn!("symbol catalog empty, keeping existing universe");
            return Ok(Vec::new());
        }

        // bounded candidate prefix for cost control
        let candidates = &all[..all.len().min(self.params.screen_depth)];
        info!("screening {} candidates", candidates.len());

        let mut scored: Vec<(String, ScreeningScore)> = Vec::new();
        for (index, symbol) in candidates.iter().enumerate() {
            if index > 0 {
                // pacing bounds the outbound call rate
                time::sleep(self.params.sweep_pacing()).await;
            }
            let score =
                score_symbol(&self.strategies, symbol, self.params.strategy_timeout()).await;
            if qualifies(&score) {
                scored.push((symbol.clone(), score));
            }
        }

        let ranked = rank(scored, self.params.universe_size);
        if ranked.is_empty() {
            warn!("no symbol qualified, falling back to volume ranking");
            return Ok(all
                .iter()
                .take(self.params.universe_size)
                .cloned()
                .collect());
        }
        info!("screening selected {} symbols", ranked.len());
        Ok(ranked)
    }
}

/// Stable ordering by (buy votes desc, total score desc): deterministic
/// given the same set of returned signals.
pub fn rank(mut scored: Vec<(String, ScreeningScore)>, limit: usize) -> Vec<String> {
    scored.sort_by(|a, b| {
        b.1.buy_votes
            .cmp(&a.1.buy_votes)
            .then(
                b.1.total_score
                    .partial_cmp(&a.1.total_score)
                    .unwrap_or(Ordering::Equal),
            )
    });
    scored.truncate(limit);
    scored.into_iter().map(|(symbol, _)| symbol).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use common::models::{Direction, StrategySignal};

    fn score(buy_votes: u32, total_score: f64) -> ScreeningScore {
        ScreeningScore {
            buy_votes,
            total_score,
            signals: Default::default(),
        }
    }

    #[test]
    fn rank_orders_by_votes_then_score() {
        let scored = vec![
            ("A".to_string(), score(2, 4.0)),
            ("B".to_string(), score(3, 1.0)),
            ("C".to_string(), score(2, 9.0)),
        ];
        assert_eq!(rank(scored, 10), vec!["B", "C", "A"]);
    }

    #[test]
    fn rank_caps_the_universe_size() {
        let scored: Vec<_> = (0..150)
            .map(|i| (format!("S{i:03}"), score(2, i as f64)))
            .collect();
        let ranked = rank(scored, 100);
        assert_eq!(ranked.len(), 100);
        assert_eq!(ranked[0], "S149");
    }

    #[test]
    fn rank_is_deterministic_for_equal_scores() {
        let scored = vec![
            ("A".to_string(), score(2, 5.0)),
            ("B".to_string(), score(2, 5.0)),
        ];
        // stable sort preserves the input order of ties
        assert_eq!(rank(scored, 10), vec!["A", "B"]);
    }

    struct FixedCatalog(Vec<String>);

    #[async_trait]
    impl SymbolCatalog for FixedCatalog {
        async fn get_tradable_symbols(
            &self,
            _market: MarketType,
        ) -> Result<Vec<String>, EngineError> {
            Ok(self.0.clone())
        }
    }

    /// Votes BUY only for one favoured symbol.
    struct Favours {
        name: &'static str,
        symbol: &'static str,
    }

    #[async_trait]
    impl Strategy for Favours {
        fn name(&self) -> &'static str {
            self.name
        }
        async fn get_signal(&self, symbol: &str) -> Result<StrategySignal, EngineError> {
            if symbol == self.symbol {
                Ok(StrategySignal {
                    direction: Direction::Buy,
                    strength: 5.0,
                    confidence: 0.7,
                })
            } else {
                Ok(StrategySignal::none())
            }
        }
    }

    fn fast_params() -> SupervisorParams {
        SupervisorParams {
            sweep_pacing_ms: 1,
            ..SupervisorParams::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unqualified_symbols_never_rank() {
        let catalog = Arc::new(FixedCatalog(vec![
            "AAA".to_string(),
            "BBB".to_string(),
            "CCC".to_string(),
        ]));
        let strategies: Vec<Arc<dyn Strategy>> = vec![
            Arc::new(Favours { name: "s1", symbol: "BBB" }),
            Arc::new(Favours { name: "s2", symbol: "BBB" }),
        ];
        let screener = UniverseScreener::new(catalog, strategies, fast_params());
        let universe = screener.screen().await.unwrap();
        assert_eq!(universe, vec!["BBB"]);
    }

    #[tokio::test(start_paused = true)]
    async fn no_qualifiers_falls_back_to_volume_ranking() {
        let symbols: Vec<String> = (0..120).map(|i| format!("S{i:03}")).collect();
        let catalog = Arc::new(FixedCatalog(symbols.clone()));
        // a single voter can never reach two BUY votes
        let strategies: Vec<Arc<dyn Strategy>> =
            vec![Arc::new(Favours { name: "s1", symbol: "S000" })];
        let screener = UniverseScreener::new(catalog, strategies, fast_params());
        let universe = screener.screen().await.unwrap();
        assert_eq!(universe.len(), 100);
        assert_eq!(universe[0], "S000");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_catalog_yields_empty_outcome() {
        let screener = UniverseScreener::new(
            Arc::new(FixedCatalog(Vec::new())),
            Vec::new(),
            fast_params(),
        );
        assert!(screener.screen().await.unwrap().is_empty());
    }
}
