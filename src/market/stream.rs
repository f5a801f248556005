//! Streaming quote connection shared by the WebSocket-capable providers
//!
//! One connection task per provider. Subscribe/unsubscribe frames reach the
//! task through a command channel; parsed prices fan out on a broadcast
//! channel. The connection is opened lazily on first subscribe and is not
//! re-established once the remote side closes it.

use futures_util::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::error::PlatformError;
use crate::models::StockPrice;
use crate::Result;

const FEED_CAPACITY: usize = 1024;
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_HANDSHAKE_FRAMES: usize = 4;

/// Wire dialect of a provider's streaming feed
pub trait FeedProtocol: Send + Sync + 'static {
    /// Frame sent right after the socket opens, if the feed authenticates
    fn auth_frame(&self) -> Option<String> {
        None
    }

    /// Inspect a handshake frame. `Ok(true)` once authenticated.
    fn check_handshake(&self, _frame: &str) -> Result<bool> {
        Ok(true)
    }

    fn subscribe_frames(&self, tickers: &[String]) -> Vec<String>;

    fn unsubscribe_frames(&self, tickers: &[String]) -> Vec<String>;

    /// Extract zero or more prices from one text frame
    fn parse(&self, frame: &str) -> Vec<StockPrice>;
}

enum StreamCommand {
    Send(Vec<String>),
    Close,
}

pub struct QuoteStream {
    name: &'static str,
    url: String,
    protocol: Arc<dyn FeedProtocol>,
    tx: broadcast::Sender<StockPrice>,
    commands: Mutex<Option<mpsc::UnboundedSender<StreamCommand>>>,
    subscribed: Mutex<HashSet<String>>,
}

impl QuoteStream {
    pub fn new(name: &'static str, url: impl Into<String>, protocol: Arc<dyn FeedProtocol>) -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            name,
            url: url.into(),
            protocol,
            tx,
            commands: Mutex::new(None),
            subscribed: Mutex::new(HashSet::new()),
        }
    }

    pub fn receiver(&self) -> broadcast::Receiver<StockPrice> {
        self.tx.subscribe()
    }

    pub async fn is_connected(&self) -> bool {
        self.commands
            .lock()
            .await
            .as_ref()
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    pub async fn subscribed(&self) -> Vec<String> {
        let mut tickers: Vec<String> = self.subscribed.lock().await.iter().cloned().collect();
        tickers.sort();
        tickers
    }

    /// Open the socket and spawn the connection task (no-op when already open)
    pub async fn connect(&self) -> Result<()> {
        let mut commands = self.commands.lock().await;
        if commands.as_ref().map(|tx| !tx.is_closed()).unwrap_or(false) {
            return Ok(());
        }

        let (ws_stream, _) = connect_async(self.url.as_str()).await.map_err(|e| {
            PlatformError::MarketData(format!("{} stream connect failed: {}", self.name, e))
        })?;
        let (mut write, mut read) = ws_stream.split();

        if let Some(auth) = self.protocol.auth_frame() {
            write
                .send(Message::Text(auth))
                .await
                .map_err(|e| PlatformError::MarketData(format!("{} auth send failed: {}", self.name, e)))?;

            let mut authenticated = false;
            for _ in 0..MAX_HANDSHAKE_FRAMES {
                let frame = tokio::time::timeout(HANDSHAKE_TIMEOUT, read.next())
                    .await
                    .map_err(|_| {
                        PlatformError::MarketData(format!("{} auth timed out", self.name))
                    })?;

                match frame {
                    Some(Ok(Message::Text(text))) => {
                        debug!("{} stream handshake frame: {}", self.name, text);
                        if self.protocol.check_handshake(&text)? {
                            authenticated = true;
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return Err(PlatformError::MarketData(format!(
                            "{} auth failed: {}",
                            self.name, e
                        )))
                    }
                    None => break,
                }
            }

            if !authenticated {
                return Err(PlatformError::MarketData(format!(
                    "{} stream closed during authentication",
                    self.name
                )));
            }
        }

        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
        let protocol = self.protocol.clone();
        let tx = self.tx.clone();
        let name = self.name;

        // Replay the current subscription set on the fresh connection
        let existing: Vec<String> = self.subscribed.lock().await.iter().cloned().collect();
        if !existing.is_empty() {
            let _ = cmd_tx.send(StreamCommand::Send(protocol.subscribe_frames(&existing)));
        }

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = read.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                for price in protocol.parse(&text) {
                                    let _ = tx.send(price);
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                let _ = write.send(Message::Pong(data)).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                info!("{} stream closed by remote", name);
                                break;
                            }
                            Some(Err(e)) => {
                                warn!("{} stream error: {}", name, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    cmd = cmd_rx.recv() => {
                        match cmd {
                            Some(StreamCommand::Send(frames)) => {
                                for frame in frames {
                                    if let Err(e) = write.send(Message::Text(frame)).await {
                                        warn!("{} stream send failed: {}", name, e);
                                    }
                                }
                            }
                            Some(StreamCommand::Close) | None => {
                                let _ = write.send(Message::Close(None)).await;
                                info!("{} stream disconnected", name);
                                break;
                            }
                        }
                    }
                }
            }
        });

        *commands = Some(cmd_tx);
        info!("Connected to {} stream", self.name);
        Ok(())
    }

    pub async fn disconnect(&self) {
        if let Some(tx) = self.commands.lock().await.take() {
            let _ = tx.send(StreamCommand::Close);
        }
    }

    pub async fn subscribe(&self, tickers: &[String]) -> Result<()> {
        if tickers.is_empty() {
            return Ok(());
        }

        self.connect().await?;
        self.subscribed.lock().await.extend(tickers.iter().cloned());
        self.send(self.protocol.subscribe_frames(tickers)).await?;

        info!("{}: subscribed to {:?}", self.name, tickers);
        Ok(())
    }

    pub async fn unsubscribe(&self, tickers: &[String]) -> Result<()> {
        if tickers.is_empty() {
            return Ok(());
        }

        {
            let mut subscribed = self.subscribed.lock().await;
            for ticker in tickers {
                subscribed.remove(ticker);
            }
        }

        if self.is_connected().await {
            self.send(self.protocol.unsubscribe_frames(tickers)).await?;
        }

        info!("{}: unsubscribed from {:?}", self.name, tickers);
        Ok(())
    }

    async fn send(&self, frames: Vec<String>) -> Result<()> {
        let commands = self.commands.lock().await;
        let tx = commands
            .as_ref()
            .ok_or_else(|| PlatformError::MarketData(format!("{} stream not connected", self.name)))?;

        tx.send(StreamCommand::Send(frames))
            .map_err(|_| PlatformError::MarketData(format!("{} stream closed", self.name)))
    }
}
