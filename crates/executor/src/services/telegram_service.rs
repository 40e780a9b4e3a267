use std::env;

use teloxide::prelude::*;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use common::alerts::{AlertLevel, Notification};
use common::error::EngineError;

fn level_prefix(level: AlertLevel) -> &'static str {
    match level {
        AlertLevel::Error => "🚨 *ERROR*",
        AlertLevel::Warning => "⚠️ *WARNING*",
        AlertLevel::Info => "ℹ️ *INFO*",
        AlertLevel::Success => "✅ *SUCCESS*",
        AlertLevel::Trade => "💰 *TRADE*",
    }
}

/// Delivers queued notifications to the operator chat. Send failures are
/// logged and dropped; the service drains the channel until every
/// producer handle is gone, which is what shutdown waits on.
pub struct TelegramService {
    bot: Bot,
    chat_id: ChatId,
    ready_tx: watch::Sender<bool>,
}

impl TelegramService {
    pub fn from_env() -> Result<Self, EngineError> {
        let token = env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| EngineError::Config("TELEGRAM_BOT_TOKEN not set".to_string()))?;
        let chat_id = env::var("TELEGRAM_CHAT_ID")
            .map_err(|_| EngineError::Config("TELEGRAM_CHAT_ID not set".to_string()))?
            .parse::<i64>()
            .map_err(|_| EngineError::Config("TELEGRAM_CHAT_ID must be a number".to_string()))?;
        let (ready_tx, _) = watch::channel(false);
        Ok(Self {
            bot: Bot::new(token),
            chat_id: ChatId(chat_id),
            ready_tx,
        })
    }

    /// Signalled once after the bot has introduced itself to the API.
    pub fn ready(&self) -> watch::Receiver<bool> {
        self.ready_tx.subscribe()
    }

    pub async fn start(self, mut rx: mpsc::Receiver<Notification>) {
        info!("starting telegram notification service");

        match self.bot.get_me().await {
            Ok(me) => {
                info!("telegram bot ready: @{}", me.username());
                let _ = self.ready_tx.send(true);
            }
            Err(e) => warn!("telegram readiness check failed: {e}"),
        }

        while let Some(note) = rx.recv().await {
            let text = format!("{}\n\n{}", level_prefix(note.level), note.text);
            if let Err(e) = self.bot.send_message(self.chat_id, text).await {
                error!("failed to send telegram message: {e}");
            }
        }
        info!("notification channel closed, telegram service stopping");
    }
}
