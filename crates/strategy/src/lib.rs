pub mod engine;
pub mod indicators;
pub mod ledger;
pub mod registry;
pub mod scorer;
pub mod screener;
pub mod sizing;
pub mod strategies;
pub mod traits;
pub mod window;
