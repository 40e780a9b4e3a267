use chrono::NaiveDate;

/// Daily performance snapshot persisted at close of market.
#[derive(Debug, Clone)]
pub struct PerformanceSummary {
    pub date: NaiveDate,
    pub daily_pnl: f64,
    pub daily_trades: i64,
    pub win_rate: f64,
    pub total_pnl: f64,
}

/// A filled or submitted order as recorded for audit.
#[derive(Debug, Clone)]
pub struct TradeRecord {
    pub symbol: String,
    pub side: String,
    pub price: f64,
    pub quantity: u32,
    pub strategy: String,
    pub reason: String,
}
