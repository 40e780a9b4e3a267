pub mod order;
pub mod position;
pub mod report;
pub mod signal;
pub mod tick;

pub use order::{AccountBalance, Candle, OrderAck, OrderRequest, OrderType, SymbolInfo};
pub use position::{ExitReason, Position, Side};
pub use report::{PerformanceSummary, TradeRecord};
pub use signal::{Direction, ScreeningScore, StrategySignal};
pub use tick::{OrderbookSnapshot, Tick};
