use super::position::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
}

/// A fully specified order, carrying strategy and reason tags for
/// downstream audit.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub quantity: u32,
    /// None for market orders.
    pub price: Option<f64>,
    pub order_type: OrderType,
    pub strategy_tag: String,
    pub reason_tag: String,
}

#[derive(Debug, Clone)]
pub struct OrderAck {
    pub order_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct AccountBalance {
    /// Deposit cash available for new orders.
    pub cash_balance: f64,
    /// Total account valuation including held positions.
    pub total_balance: f64,
}

#[derive(Debug, Clone)]
pub struct SymbolInfo {
    pub symbol: String,
    pub name: String,
    pub current_price: f64,
    pub prev_close: f64,
    pub change_rate: f64,
    pub volume: i64,
}

/// One price bar, minute or daily depending on the query.
#[derive(Debug, Clone, Copy)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}
