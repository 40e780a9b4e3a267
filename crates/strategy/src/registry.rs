use std::sync::Arc;

use market_data::traits::TradingApi;

use crate::strategies::{
    BreakoutStrategy, GapStrategy, MomentumStrategy, VolumeSpikeStrategy, VwapStrategy,
};
use crate::traits::Strategy;

/// Builds the fixed strategy registry at startup. Strategies are an
/// explicit ordered collection; a missing strategy is a construction-time
/// change, never a runtime lookup.
pub fn build(api: Arc<dyn TradingApi>) -> Vec<Arc<dyn Strategy>> {
    vec![
        Arc::new(BreakoutStrategy::new(api.clone())),
        Arc::new(MomentumStrategy::new(api.clone())),
        Arc::new(GapStrategy::new(api.clone())),
        Arc::new(VwapStrategy::new(api.clone())),
        Arc::new(VolumeSpikeStrategy::new(api)),
    ]
}
