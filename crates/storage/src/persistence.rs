use std::collections::HashMap;
use std::path::Path;

use chrono::{Local, NaiveDate};
use sqlx::{Row, SqlitePool};
use tracing::info;

use common::models::{PerformanceSummary, TradeRecord};

use crate::db;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemStatus {
    Initializing,
    Running,
    Stopped,
    Error,
}

impl SystemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SystemStatus::Initializing => "INITIALIZING",
            SystemStatus::Running => "RUNNING",
            SystemStatus::Stopped => "STOPPED",
            SystemStatus::Error => "ERROR",
        }
    }
}

/// Durable store for system status, executed trades, and daily
/// performance snapshots.
pub struct Persistence {
    pool: SqlitePool,
}

impl Persistence {
    pub async fn connect(db_path: &str) -> Result<Self, sqlx::Error> {
        Ok(Self {
            pool: db::open_pool(db_path).await?,
        })
    }

    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        Ok(Self {
            pool: db::open_in_memory().await?,
        })
    }

    pub async fn update_system_status(
        &self,
        status: SystemStatus,
        detail: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO system_status (status, detail, updated_at) VALUES (?, ?, ?)")
            .bind(status.as_str())
            .bind(detail)
            .bind(Local::now().format("%Y-%m-%d %H:%M:%S").to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn latest_status(&self) -> Result<Option<String>, sqlx::Error> {
        let row = sqlx::query("SELECT status FROM system_status ORDER BY id DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("status")))
    }

    pub async fn save_trade(&self, trade: &TradeRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO trades (symbol, side, price, quantity, strategy, reason, executed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&trade.symbol)
        .bind(&trade.side)
        .bind(trade.price)
        .bind(trade.quantity as i64)
        .bind(&trade.strategy)
        .bind(&trade.reason)
        .bind(Local::now().format("%Y-%m-%d %H:%M:%S").to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_performance(&self, summary: &PerformanceSummary) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR REPLACE INTO performance (date, daily_pnl, daily_trades, win_rate, total_pnl)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(summary.date.format("%Y-%m-%d").to_string())
        .bind(summary.daily_pnl)
        .bind(summary.daily_trades)
        .bind(summary.win_rate)
        .bind(summary.total_pnl)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Builds the close-of-market snapshot from the day's trades: cash
    /// delta as daily pnl, win rate over sells against the day's average
    /// buy price per symbol, and the running total carried forward from
    /// the latest stored snapshot.
    pub async fn daily_summary(&self, date: NaiveDate) -> Result<PerformanceSummary, sqlx::Error> {
        let day = date.format("%Y-%m-%d").to_string();
        let rows = sqlx::query(
            "SELECT symbol, side, price, quantity FROM trades
             WHERE substr(executed_at, 1, 10) = ? ORDER BY id",
        )
        .bind(&day)
        .fetch_all(&self.pool)
        .await?;

        let mut daily_pnl = 0.0;
        let mut buy_totals: HashMap<String, (f64, i64)> = HashMap::new();
        let mut sells = 0u32;
        let mut wins = 0u32;

        for row in &rows {
            let symbol: String = row.get("symbol");
            let side: String = row.get("side");
            let price: f64 = row.get("price");
            let quantity: i64 = row.get("quantity");
            let notional = price * quantity as f64;
            if side == "BUY" {
                daily_pnl -= notional;
                let entry = buy_totals.entry(symbol).or_default();
                entry.0 += notional;
                entry.1 += quantity;
            } else {
                daily_pnl += notional;
                sells += 1;
                if let Some((total, qty)) = buy_totals.get(&symbol) {
                    if *qty > 0 && price > total / *qty as f64 {
                        wins += 1;
                    }
                }
            }
        }

        let win_rate = if sells > 0 {
            wins as f64 / sells as f64
        } else {
            0.0
        };

        let prior_total: f64 = sqlx::query(
            "SELECT total_pnl FROM performance WHERE date < ? ORDER BY date DESC LIMIT 1",
        )
        .bind(&day)
        .fetch_optional(&self.pool)
        .await?
        .map(|r| r.get("total_pnl"))
        .unwrap_or(0.0);

        Ok(PerformanceSummary {
            date,
            daily_pnl,
            daily_trades: rows.len() as i64,
            win_rate,
            total_pnl: prior_total + daily_pnl,
        })
    }

    /// Copies the live database into a dated file under `backup_dir`.
    pub async fn backup(&self, backup_dir: &str) -> Result<String, sqlx::Error> {
        std::fs::create_dir_all(backup_dir).map_err(|e| sqlx::Error::Io(e))?;
        let target = Path::new(backup_dir)
            .join(format!("backup_{}.db", Local::now().format("%Y%m%d")))
            .to_string_lossy()
            .into_owned();
        sqlx::query(&format!("VACUUM INTO '{target}'"))
            .execute(&self.pool)
            .await?;
        info!("database backed up to {target}");
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(symbol: &str, side: &str, price: f64, quantity: u32) -> TradeRecord {
        TradeRecord {
            symbol: symbol.to_string(),
            side: side.to_string(),
            price,
            quantity,
            strategy: "scalping".to_string(),
            reason: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn status_round_trip() {
        let store = Persistence::in_memory().await.unwrap();
        store
            .update_system_status(SystemStatus::Initializing, None)
            .await
            .unwrap();
        store
            .update_system_status(SystemStatus::Running, Some("all good"))
            .await
            .unwrap();
        assert_eq!(store.latest_status().await.unwrap().as_deref(), Some("RUNNING"));
    }

    #[tokio::test]
    async fn daily_summary_aggregates_trades() {
        let store = Persistence::in_memory().await.unwrap();
        store.save_trade(&trade("005930", "BUY", 100.0, 10)).await.unwrap();
        store.save_trade(&trade("005930", "SELL", 110.0, 10)).await.unwrap();
        store.save_trade(&trade("000660", "BUY", 50.0, 10)).await.unwrap();

        let summary = store.daily_summary(Local::now().date_naive()).await.unwrap();
        assert_eq!(summary.daily_trades, 3);
        // -1000 + 1100 - 500
        assert!((summary.daily_pnl - (-400.0)).abs() < 1e-9);
        // one sell, above the day's average buy price
        assert!((summary.win_rate - 1.0).abs() < 1e-9);
        assert!((summary.total_pnl - summary.daily_pnl).abs() < 1e-9);
    }

    #[tokio::test]
    async fn performance_snapshot_upserts() {
        let store = Persistence::in_memory().await.unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 8, 5).unwrap();
        let snapshot = PerformanceSummary {
            date,
            daily_pnl: 1500.0,
            daily_trades: 4,
            win_rate: 0.5,
            total_pnl: 1500.0,
        };
        store.save_performance(&snapshot).await.unwrap();
        store.save_performance(&snapshot).await.unwrap();
    }
}
