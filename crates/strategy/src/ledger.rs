use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use common::config::TradingParams;
use common::models::{ExitReason, Position};

/// Per-symbol open-position records. The lifecycle is FLAT -> OPEN ->
/// FLAT: `try_open` is the single entry gate shared by the scalp engine
/// and the buy sweep, so a symbol can never carry two positions.
pub struct PositionLedger {
    positions: Mutex<HashMap<String, Position>>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self {
            positions: Mutex::new(HashMap::new()),
        }
    }

    /// Records the position unless one already exists for the symbol.
    /// Returns false (and leaves the ledger untouched) on a duplicate.
    pub async fn try_open(&self, position: Position) -> bool {
        let mut guard = self.positions.lock().await;
        if guard.contains_key(&position.symbol) {
            return false;
        }
        guard.insert(position.symbol.clone(), position);
        true
    }

    pub async fn close(&self, symbol: &str) -> Option<Position> {
        self.positions.lock().await.remove(symbol)
    }

    pub async fn get(&self, symbol: &str) -> Option<Position> {
        self.positions.lock().await.get(symbol).cloned()
    }

    pub async fn has(&self, symbol: &str) -> bool {
        self.positions.lock().await.contains_key(symbol)
    }

    pub async fn open_positions(&self) -> Vec<Position> {
        self.positions.lock().await.values().cloned().collect()
    }
}

impl Default for PositionLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Exit decision for one open position, evaluated every cycle. Stop loss
/// is checked first and wins when thresholds coincide.
pub fn exit_reason(
    position: &Position,
    current_price: f64,
    now: DateTime<Utc>,
    params: &TradingParams,
) -> Option<ExitReason> {
    let pnl = position.pnl_rate(current_price);
    if pnl <= -params.stop_loss {
        Some(ExitReason::StopLoss)
    } else if pnl >= params.take_profit {
        Some(ExitReason::TakeProfit)
    } else if position.holding_secs(now) >= params.hold_time_secs as i64 {
        Some(ExitReason::TimeExit)
    } else {
        None
    }
}

/// Independent of the regular exit conditions: any move beyond the
/// emergency threshold forces the position flat.
pub fn is_emergency(position: &Position, current_price: f64, threshold: f64) -> bool {
    position.pnl_rate(current_price).abs() > threshold
}
