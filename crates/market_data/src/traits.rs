use async_trait::async_trait;

use common::error::EngineError;
use common::models::{AccountBalance, Candle, OrderAck, OrderRequest, SymbolInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedChannel {
    Price,
    Orderbook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketType {
    All,
    Kospi,
    Kosdaq,
}

/// Live market data connection. Parsed ticks and orderbook snapshots are
/// delivered on the gateway's broadcast channel; subscribing here only
/// registers interest with the remote feed.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    async fn connect(&self) -> Result<(), EngineError>;
    fn is_connected(&self) -> bool;
    async fn subscribe_price(&self, symbol: &str) -> Result<(), EngineError>;
    async fn subscribe_orderbook(&self, symbol: &str) -> Result<(), EngineError>;
    async fn unsubscribe(&self, symbol: &str, channel: FeedChannel) -> Result<(), EngineError>;
    async fn close(&self) -> Result<(), EngineError>;
}

/// Brokerage order/account transport.
#[async_trait]
pub trait TradingApi: Send + Sync {
    async fn get_account_balance(&self) -> Result<AccountBalance, EngineError>;
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, EngineError>;
    async fn get_symbol_info(&self, symbol: &str) -> Result<SymbolInfo, EngineError>;
    async fn get_minute_candles(
        &self,
        symbol: &str,
        count: usize,
    ) -> Result<Vec<Candle>, EngineError>;
    async fn get_daily_candles(
        &self,
        symbol: &str,
        count: usize,
    ) -> Result<Vec<Candle>, EngineError>;
    /// Watchdog recovery action. Returns the broker's status message.
    async fn force_token_refresh(&self) -> Result<String, EngineError>;
}

/// Exchange-wide tradable symbol lookup, volume-ranked.
#[async_trait]
pub trait SymbolCatalog: Send + Sync {
    async fn get_tradable_symbols(&self, market: MarketType)
    -> Result<Vec<String>, EngineError>;
}
