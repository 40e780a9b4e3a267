use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

use common::config::ApiCredentials;
use common::error::EngineError;
use common::models::{OrderbookSnapshot, Tick};

use crate::remote::realtime::{
    RealtimeFrame, TR_ORDERBOOK, TR_PRICE, parse_frame, pong_frame, subscription_request,
};
use crate::traits::{FeedChannel, MarketFeed};

const MAX_RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Parsed market data fanned out to every engine subscriber.
#[derive(Debug)]
pub enum MarketEvent {
    Tick { symbol: String, tick: Tick },
    Orderbook { symbol: String, book: OrderbookSnapshot },
}

enum FeedCommand {
    Register { symbol: String, channel: FeedChannel },
    Deregister { symbol: String, channel: FeedChannel },
    Close,
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Realtime gateway to the brokerage websocket. Subscriptions are
/// registered through a command channel owned by the io task; parsed
/// frames are broadcast as `MarketEvent`s.
pub struct KisFeed {
    creds: ApiCredentials,
    http: Client,
    market_tx: broadcast::Sender<Arc<MarketEvent>>,
    cmd_tx: StdMutex<Option<mpsc::Sender<FeedCommand>>>,
    connected: Arc<AtomicBool>,
}

#[derive(Deserialize)]
struct ApprovalResponse {
    approval_key: String,
}

fn channel_tr_id(channel: FeedChannel) -> &'static str {
    match channel {
        FeedChannel::Price => TR_PRICE,
        FeedChannel::Orderbook => TR_ORDERBOOK,
    }
}

impl KisFeed {
    pub fn new(creds: ApiCredentials, market_tx: broadcast::Sender<Arc<MarketEvent>>) -> Self {
        Self {
            creds,
            http: Client::new(),
            market_tx,
            cmd_tx: StdMutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Arc<MarketEvent>> {
        self.market_tx.subscribe()
    }

    async fn approval_key(http: &Client, creds: &ApiCredentials) -> Result<String, EngineError> {
        let url = format!("{}/oauth2/Approval", creds.base_url);
        let body = json!({
            "grant_type": "client_credentials",
            "appkey": creds.app_key,
            "secretkey": creds.app_secret,
        });
        let resp = http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Feed(format!("approval key request: {e}")))?;
        if !resp.status().is_success() {
            return Err(EngineError::Feed(format!(
                "approval key request returned {}",
                resp.status()
            )));
        }
        let approval: ApprovalResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::Feed(format!("approval key response: {e}")))?;
        Ok(approval.approval_key)
    }

    async fn open_socket(
        http: &Client,
        creds: &ApiCredentials,
    ) -> Result<(WsSink, WsSource, String), EngineError> {
        let approval_key = Self::approval_key(http, creds).await?;
        let (stream, _) = connect_async(&creds.ws_url)
            .await
            .map_err(|e| EngineError::Feed(format!("websocket connect: {e}")))?;
        let (write, read) = stream.split();
        Ok((write, read, approval_key))
    }

    async fn send_command(&self, cmd: FeedCommand) -> Result<(), EngineError> {
        let tx = {
            let guard = self.cmd_tx.lock().unwrap();
            guard.clone()
        };
        match tx {
            Some(tx) => tx
                .send(cmd)
                .await
                .map_err(|_| EngineError::Feed("feed io task gone".to_string())),
            None => Err(EngineError::Feed("feed not connected".to_string())),
        }
    }

    async fn io_loop(
        http: Client,
        creds: ApiCredentials,
        market_tx: broadcast::Sender<Arc<MarketEvent>>,
        connected: Arc<AtomicBool>,
        mut cmd_rx: mpsc::Receiver<FeedCommand>,
        mut write: WsSink,
        mut read: WsSource,
        mut approval_key: String,
    ) {
        let mut subscriptions: HashSet<(String, FeedChannel)> = HashSet::new();

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(FeedCommand::Register { symbol, channel }) => {
                        let frame = subscription_request(
                            &approval_key, channel_tr_id(channel), &symbol, true);
                        if let Err(e) = write.send(Message::text(frame)).await {
                            warn!("subscribe {symbol}: {e}");
                        }
                        subscriptions.insert((symbol, channel));
                    }
                    Some(FeedCommand::Deregister { symbol, channel }) => {
                        let frame = subscription_request(
                            &approval_key, channel_tr_id(channel), &symbol, false);
                        if let Err(e) = write.send(Message::text(frame)).await {
                            warn!("unsubscribe {symbol}: {e}");
                        }
                        subscriptions.remove(&(symbol, channel));
                    }
                    Some(FeedCommand::Close) | None => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                },
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => match parse_frame(text.as_str()) {
                        Some(RealtimeFrame::Tick { symbol, tick }) => {
                            let _ = market_tx.send(Arc::new(MarketEvent::Tick { symbol, tick }));
                        }
                        Some(RealtimeFrame::Orderbook { symbol, book }) => {
                            let _ = market_tx
                                .send(Arc::new(MarketEvent::Orderbook { symbol, book }));
                        }
                        Some(RealtimeFrame::PingPong) => {
                            let _ = write.send(Message::text(pong_frame())).await;
                        }
                        Some(RealtimeFrame::Control(raw)) => debug!("feed control: {raw}"),
                        None => warn!("unparsable feed frame"),
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = write.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        warn!("feed socket closed by remote");
                        match Self::reopen(&http, &creds, &subscriptions).await {
                            Some((w, r, key)) => {
                                write = w;
                                read = r;
                                approval_key = key;
                            }
                            None => break,
                        }
                    }
                    Some(Err(e)) => {
                        error!("feed socket error: {e}");
                        match Self::reopen(&http, &creds, &subscriptions).await {
                            Some((w, r, key)) => {
                                write = w;
                                read = r;
                                approval_key = key;
                            }
                            None => break,
                        }
                    }
                    Some(Ok(_)) => {}
                },
            }
        }
        connected.store(false, Ordering::SeqCst);
        info!("feed io task stopped");
    }

    /// Reconnects with bounded retries and restores every active
    /// subscription; None once the attempts are exhausted.
    async fn reopen(
        http: &Client,
        creds: &ApiCredentials,
        subscriptions: &HashSet<(String, FeedChannel)>,
    ) -> Option<(WsSink, WsSource, String)> {
        for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
            info!("feed reconnect attempt {attempt}/{MAX_RECONNECT_ATTEMPTS}");
            time::sleep(RECONNECT_DELAY).await;
            match Self::open_socket(http, creds).await {
                Ok((mut write, read, approval_key)) => {
                    for (symbol, channel) in subscriptions {
                        let frame = subscription_request(
                            &approval_key, channel_tr_id(*channel), symbol, true);
                        if let Err(e) = write.send(Message::text(frame)).await {
                            warn!("resubscribe {symbol}: {e}");
                        }
                    }
                    info!("feed reconnected, {} subscriptions restored", subscriptions.len());
                    return Some((write, read, approval_key));
                }
                Err(e) => warn!("feed reconnect failed: {e}"),
            }
        }
        error!("feed reconnect attempts exhausted");
        None
    }
}

#[async_trait]
impl MarketFeed for KisFeed {
    async fn connect(&self) -> Result<(), EngineError> {
        if self.is_connected() {
            return Ok(());
        }
        let (write, read, approval_key) = Self::open_socket(&self.http, &self.creds).await?;
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        {
            let mut guard = self.cmd_tx.lock().unwrap();
            *guard = Some(cmd_tx);
        }
        self.connected.store(true, Ordering::SeqCst);
        tokio::spawn(Self::io_loop(
            self.http.clone(),
            self.creds.clone(),
            self.market_tx.clone(),
            self.connected.clone(),
            cmd_rx,
            write,
            read,
            approval_key,
        ));
        info!("feed connected to {}", self.creds.ws_url);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn subscribe_price(&self, symbol: &str) -> Result<(), EngineError> {
        self.send_command(FeedCommand::Register {
            symbol: symbol.to_string(),
            channel: FeedChannel::Price,
        })
        .await
    }

    async fn subscribe_orderbook(&self, symbol: &str) -> Result<(), EngineError> {
        self.send_command(FeedCommand::Register {
            symbol: symbol.to_string(),
            channel: FeedChannel::Orderbook,
        })
        .await
    }

    async fn unsubscribe(&self, symbol: &str, channel: FeedChannel) -> Result<(), EngineError> {
        self.send_command(FeedCommand::Deregister {
            symbol: symbol.to_string(),
            channel,
        })
        .await
    }

    async fn close(&self) -> Result<(), EngineError> {
        let result = self.send_command(FeedCommand::Close).await;
        self.connected.store(false, Ordering::SeqCst);
        {
            let mut guard = self.cmd_tx.lock().unwrap();
            *guard = None;
        }
        result
    }
}
