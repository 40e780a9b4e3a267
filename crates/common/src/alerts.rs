use chrono::Local;
use tokio::sync::mpsc;
use tracing::warn;

use crate::models::{ExitReason, OrderRequest, PerformanceSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Success,
    Warning,
    Error,
    Trade,
}

/// One operator-facing message, queued for the notification service.
#[derive(Debug, Clone)]
pub struct Notification {
    pub level: AlertLevel,
    pub text: String,
}

/// Cloneable handle for producing notifications. Delivery failures and a
/// full queue are logged, never propagated: losing an alert must not
/// abort a trading cycle.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<Notification>,
}

impl Notifier {
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }

    pub fn send(&self, level: AlertLevel, text: impl Into<String>) {
        let note = Notification {
            level,
            text: text.into(),
        };
        if let Err(e) = self.tx.try_send(note) {
            warn!("notification dropped: {e}");
        }
    }

    pub fn system_status(&self, status: &str, detail: &str) {
        let level = if status == "ERROR" {
            AlertLevel::Error
        } else {
            AlertLevel::Info
        };
        self.send(
            level,
            format!(
                "System status: {status}\nTime: {}\n{detail}",
                Local::now().format("%Y-%m-%d %H:%M:%S")
            ),
        );
    }

    pub fn trade(&self, order: &OrderRequest, order_id: &str) {
        let price = order
            .price
            .map(|p| format!("{p:.0}"))
            .unwrap_or_else(|| "market".to_string());
        self.send(
            AlertLevel::Trade,
            format!(
                "Order placed: {} {} x{} @ {price}\nStrategy: {} / {}\nOrder id: {order_id}",
                order.side.as_str(),
                order.symbol,
                order.quantity,
                order.strategy_tag,
                order.reason_tag,
            ),
        );
    }

    pub fn large_movement(&self, symbol: &str, pnl_rate: f64, volume_surge: f64) {
        let direction = if pnl_rate > 0.0 { "surge" } else { "plunge" };
        self.send(
            AlertLevel::Warning,
            format!(
                "Large {direction} detected on {symbol}\nPnL rate: {:.2}%\nVolume surge: {volume_surge:.1}x",
                pnl_rate * 100.0
            ),
        );
    }

    pub fn exit(&self, symbol: &str, reason: ExitReason, pnl_rate: f64) {
        self.send(
            AlertLevel::Trade,
            format!(
                "Position closed: {symbol}\nReason: {}\nPnL rate: {:.2}%",
                reason.as_str(),
                pnl_rate * 100.0
            ),
        );
    }

    pub fn daily_report(&self, summary: &PerformanceSummary) {
        self.send(
            AlertLevel::Info,
            format!(
                "Daily trading report - {}\nTrades: {}\nWin rate: {:.1}%\nDaily P&L: {:.0}\nTotal P&L: {:.0}",
                summary.date,
                summary.daily_trades,
                summary.win_rate * 100.0,
                summary.daily_pnl,
                summary.total_pnl,
            ),
        );
    }

    pub fn startup(&self) {
        self.send(
            AlertLevel::Success,
            format!(
                "Trading engine started\nTime: {}\nTrade and system alerts will follow.",
                Local::now().format("%Y-%m-%d %H:%M:%S")
            ),
        );
    }

    /// The normal and abnormal variants are deliberately distinct texts so
    /// an operator can tell them apart at a glance.
    pub fn shutdown(&self, error: Option<&str>) {
        match error {
            Some(msg) => self.send(
                AlertLevel::Error,
                format!(
                    "Trading engine ABNORMAL termination\nTime: {}\nError: {msg}\nPlease check the system logs.",
                    Local::now().format("%Y-%m-%d %H:%M:%S")
                ),
            ),
            None => self.send(
                AlertLevel::Info,
                format!(
                    "Trading engine stopped normally\nTime: {}",
                    Local::now().format("%Y-%m-%d %H:%M:%S")
                ),
            ),
        }
    }
}
