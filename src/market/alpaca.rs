//! Alpaca market data: REST snapshots plus the IEX stream

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, warn};

use super::stream::{FeedProtocol, QuoteStream};
use super::MarketDataProvider;
use crate::error::PlatformError;
use crate::models::StockPrice;
use crate::Result;

const ALPACA_DATA_URL: &str = "https://data.alpaca.markets";
const ALPACA_STREAM_URL: &str = "wss://stream.data.alpaca.markets/v2/iex";

pub struct AlpacaProvider {
    client: Client,
    api_key: String,
    secret_key: String,
    data_url: String,
    stream: QuoteStream,
}

impl AlpacaProvider {
    pub fn new(api_key: impl Into<String>, secret_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        let secret_key = secret_key.into();

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(15))
            .build()?;

        let feed = AlpacaFeed {
            api_key: api_key.clone(),
            secret_key: secret_key.clone(),
        };

        Ok(Self {
            client,
            api_key,
            secret_key,
            data_url: ALPACA_DATA_URL.to_string(),
            stream: QuoteStream::new("alpaca", ALPACA_STREAM_URL, Arc::new(feed)),
        })
    }

    pub fn with_data_url(mut self, data_url: impl Into<String>) -> Self {
        self.data_url = data_url.into();
        self
    }
}

#[async_trait]
impl MarketDataProvider for AlpacaProvider {
    fn name(&self) -> &'static str {
        "alpaca"
    }

    async fn connect(&self) -> Result<()> {
        self.stream.connect().await
    }

    async fn disconnect(&self) -> Result<()> {
        self.stream.disconnect().await;
        Ok(())
    }

    async fn subscribe(&self, tickers: &[String]) -> Result<()> {
        self.stream.subscribe(tickers).await
    }

    async fn unsubscribe(&self, tickers: &[String]) -> Result<()> {
        self.stream.unsubscribe(tickers).await
    }

    async fn latest_quote(&self, ticker: &str) -> Result<Option<StockPrice>> {
        let url = format!(
            "{}/v2/stocks/{}/snapshot",
            self.data_url.trim_end_matches('/'),
            ticker
        );

        let response = self
            .client
            .get(&url)
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.secret_key)
            .send()
            .await
            .map_err(|e| {
                error!("Error fetching snapshot from Alpaca: {}", e);
                PlatformError::MarketData(format!("Alpaca request failed: {}", e))
            })?;

        if !response.status().is_success() {
            error!("Alpaca API error: {} for {}", response.status(), ticker);
            return Ok(None);
        }

        let snapshot: Snapshot = response.json().await.map_err(|e| {
            error!("Failed to parse Alpaca snapshot for {}: {}", ticker, e);
            PlatformError::MarketData(format!("Alpaca parse error: {}", e))
        })?;

        let price = snapshot.into_price(ticker);
        if price.is_none() {
            warn!("No trade data in Alpaca snapshot for {}", ticker);
        }
        Ok(price)
    }

    fn price_feed(&self) -> broadcast::Receiver<StockPrice> {
        self.stream.receiver()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    latest_trade: Option<Trade>,
    daily_bar: Option<Bar>,
    prev_daily_bar: Option<Bar>,
}

#[derive(Debug, Deserialize)]
struct Trade {
    p: f64,
    t: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Bar {
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    #[serde(default)]
    v: f64,
}

impl Snapshot {
    fn into_price(self, ticker: &str) -> Option<StockPrice> {
        let trade = self.latest_trade?;
        if trade.p == 0.0 {
            return None;
        }

        let timestamp = trade
            .t
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);

        let mut price = StockPrice::trade(ticker, trade.p, 0, timestamp);

        if let Some(bar) = &self.daily_bar {
            price.open = Some(bar.o);
            price.high = Some(bar.h);
            price.low = Some(bar.l);
            price.volume = bar.v as i64;
        }

        if let Some(prev) = self.prev_daily_bar.filter(|b| b.c > 0.0) {
            let change = trade.p - prev.c;
            price.close = Some(prev.c);
            price.change = Some(round2(change));
            price.change_percent = Some(round2(change / prev.c * 100.0));
        }

        Some(price)
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

struct AlpacaFeed {
    api_key: String,
    secret_key: String,
}

impl AlpacaFeed {
    fn channel_frame(action: &str, tickers: &[String]) -> String {
        serde_json::json!({
            "action": action,
            "trades": tickers,
            "quotes": tickers,
            "bars": tickers,
        })
        .to_string()
    }
}

impl FeedProtocol for AlpacaFeed {
    fn auth_frame(&self) -> Option<String> {
        Some(
            serde_json::json!({
                "action": "auth",
                "key": self.api_key,
                "secret": self.secret_key,
            })
            .to_string(),
        )
    }

    /// The feed greets with `connected`, then answers the auth frame with
    /// `authenticated` or an error object
    fn check_handshake(&self, frame: &str) -> Result<bool> {
        let messages: Vec<serde_json::Value> = serde_json::from_str(frame)?;

        for message in &messages {
            match message.get("T").and_then(|t| t.as_str()) {
                Some("success") => {
                    if message.get("msg").and_then(|m| m.as_str()) == Some("authenticated") {
                        return Ok(true);
                    }
                }
                Some("error") => {
                    return Err(PlatformError::MarketData(format!(
                        "Alpaca authentication failed: {}",
                        message
                    )))
                }
                _ => {}
            }
        }

        Ok(false)
    }

    fn subscribe_frames(&self, tickers: &[String]) -> Vec<String> {
        vec![Self::channel_frame("subscribe", tickers)]
    }

    fn unsubscribe_frames(&self, tickers: &[String]) -> Vec<String> {
        vec![Self::channel_frame("unsubscribe", tickers)]
    }

    fn parse(&self, frame: &str) -> Vec<StockPrice> {
        let Ok(messages) = serde_json::from_str::<Vec<serde_json::Value>>(frame) else {
            return Vec::new();
        };

        messages
            .iter()
            .filter_map(|item| {
                let symbol = item.get("S")?.as_str()?;
                let timestamp = item
                    .get("t")
                    .and_then(|t| t.as_str())
                    .and_then(parse_timestamp)
                    .unwrap_or_else(Utc::now);

                match item.get("T")?.as_str()? {
                    "t" => {
                        let price = item.get("p")?.as_f64()?;
                        let size = item.get("s").and_then(|s| s.as_f64()).unwrap_or(0.0);
                        Some(StockPrice::trade(symbol, price, size as i64, timestamp))
                    }
                    "q" => {
                        let ask = item.get("ap")?.as_f64()?;
                        Some(StockPrice::trade(symbol, ask, 0, timestamp))
                    }
                    _ => None,
                }
            })
            .collect()
    }
}
