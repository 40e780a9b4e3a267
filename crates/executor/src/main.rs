use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use tokio::sync::broadcast;
use tokio::time;
use tracing::{info, warn};

use common::alerts::Notifier;
use common::config::{ApiCredentials, Settings};
use common::logger;
use market_data::remote::KisClient;
use market_data::services::market_gateway::{KisFeed, MarketEvent};
use storage::Persistence;
use strategy::ledger::PositionLedger;

use crate::services::telegram_service::TelegramService;
use crate::supervisor::Supervisor;

mod services;
mod supervisor;
mod watchdog;

const CONFIG_PATH: &str = "config.toml";
const NOTIFICATION_BUFFER: usize = 512;
const NOTIFICATION_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
const TELEGRAM_READY_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::setup_logger();
    dotenv().ok();
    info!("trading engine starting up");

    let settings = Settings::load(CONFIG_PATH)?;
    let creds = ApiCredentials::from_env()?;

    let api = Arc::new(KisClient::new(creds.clone()));
    let (market_tx, _) = broadcast::channel::<Arc<MarketEvent>>(10_000);
    let feed = Arc::new(KisFeed::new(creds, market_tx.clone()));
    let persistence = Arc::new(Persistence::connect(&settings.database.path).await?);
    let ledger = Arc::new(PositionLedger::new());

    let (notifier, notify_rx) = Notifier::channel(NOTIFICATION_BUFFER);
    let telegram = TelegramService::from_env()?;
    let mut telegram_ready = telegram.ready();
    let telegram_handle = tokio::spawn(telegram.start(notify_rx));
    if time::timeout(TELEGRAM_READY_TIMEOUT, telegram_ready.wait_for(|ready| *ready))
        .await
        .is_err()
    {
        warn!("notification channel not ready yet, continuing anyway");
    }

    let mut supervisor = Supervisor::new(
        settings,
        api.clone(),
        feed,
        api,
        ledger,
        persistence,
        notifier.clone(),
        market_tx,
    );

    let init_result = supervisor.initialize().await;
    let exit_error = match init_result {
        Ok(()) => {
            tokio::select! {
                _ = supervisor.run() => None,
                _ = tokio::signal::ctrl_c() => {
                    warn!("interrupt received, shutting down");
                    None
                }
            }
        }
        Err(e) => Some(e.to_string()),
    };

    supervisor.shutdown(exit_error.as_deref()).await;
    drop(supervisor);
    drop(notifier);

    // bounded drain of outstanding notification delivery
    if time::timeout(NOTIFICATION_DRAIN_TIMEOUT, telegram_handle)
        .await
        .is_err()
    {
        warn!("notification drain timed out");
    }

    match exit_error {
        Some(e) => Err(anyhow::anyhow!(e)),
        None => {
            info!("trading engine exited");
            Ok(())
        }
    }
}
