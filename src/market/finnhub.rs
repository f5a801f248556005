//! Finnhub quotes: REST `/quote` polling plus the trade stream

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

const FINNHUB_REST_URL: &str = "https://finnhub.io/api/v1";
const FINNHUB_WS_URL: &str = "wss://ws.finnhub.io";

pub struct FinnhubProvider {
    client: Client,
    api_key: String,
    base_url: String,
    stream: QuoteStream,
}

impl FinnhubProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(15))
            .build()?;

        let stream = QuoteStream::new(
            "finnhub",
            format!("{}?token={}", FINNHUB_WS_URL, api_key),
            Arc::new(FinnhubFeed),
        );

        Ok(Self {
            client,
            api_key,
            base_url: FINNHUB_REST_URL.to_string(),
            stream,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl MarketDataProvider for FinnhubProvider {
    fn name(&self) -> &'static str {
        "finnhub"
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
        let url = format!("{}/quote", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .get(&url)
            .query(&[("symbol", ticker), ("token", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| {
                error!("Error fetching quote from Finnhub: {}", e);
                PlatformError::MarketData(format!("Finnhub request failed: {}", e))
            })?;

        if !response.status().is_success() {
            error!("Finnhub API error: {} for {}", response.status(), ticker);
            return Ok(None);
        }

        let quote: FinnhubQuote = response.json().await.map_err(|e| {
            error!("Failed to parse Finnhub quote for {}: {}", ticker, e);
            PlatformError::MarketData(format!("Finnhub parse error: {}", e))
        })?;

        let price = quote.into_price(ticker, Utc::now());
        if price.is_none() {
            warn!("No data returned for ticker: {}", ticker);
        }
        Ok(price)
    }

    fn price_feed(&self) -> broadcast::Receiver<StockPrice> {
        self.stream.receiver()
    }
}

/// Body of `GET /quote`
#[derive(Debug, Deserialize)]
struct FinnhubQuote {
    c: Option<f64>,
    v: Option<f64>,
    d: Option<f64>,
    dp: Option<f64>,
    o: Option<f64>,
    h: Option<f64>,
    l: Option<f64>,
    pc: Option<f64>,
}

impl FinnhubQuote {
    /// `None` when the current price is missing or zero (unknown symbol)
    fn into_price(self, ticker: &str, timestamp: DateTime<Utc>) -> Option<StockPrice> {
        let price = self.c.filter(|c| *c != 0.0)?;

        Some(StockPrice {
            ticker: ticker.to_string(),
            price,
            volume: self.v.unwrap_or(0.0) as i64,
            timestamp,
            change: Some(self.d.unwrap_or(0.0)),
            change_percent: Some(self.dp.unwrap_or(0.0)),
            open: Some(self.o.unwrap_or(0.0)),
            high: Some(self.h.unwrap_or(0.0)),
            low: Some(self.l.unwrap_or(0.0)),
            close: Some(self.pc.unwrap_or(0.0)),
        })
    }
}

struct FinnhubFeed;

impl FeedProtocol for FinnhubFeed {
    fn subscribe_frames(&self, tickers: &[String]) -> Vec<String> {
        tickers
            .iter()
            .map(|t| serde_json::json!({"type": "subscribe", "symbol": t}).to_string())
            .collect()
    }

    fn unsubscribe_frames(&self, tickers: &[String]) -> Vec<String> {
        tickers
            .iter()
            .map(|t| serde_json::json!({"type": "unsubscribe", "symbol": t}).to_string())
            .collect()
    }

    fn parse(&self, frame: &str) -> Vec<StockPrice> {
        let Ok(message) = serde_json::from_str::<serde_json::Value>(frame) else {
            return Vec::new();
        };

        if message.get("type").and_then(|t| t.as_str()) != Some("trade") {
            return Vec::new();
        }

        message
            .get("data")
            .and_then(|d| d.as_array())
            .map(|trades| {
                trades
                    .iter()
                    .filter_map(|trade| {
                        let symbol = trade.get("s")?.as_str()?;
                        let price = trade.get("p")?.as_f64()?;
                        let volume = trade.get("v").and_then(|v| v.as_f64()).unwrap_or(0.0);
                        let timestamp = trade
                            .get("t")
                            .and_then(|t| t.as_i64())
                            .and_then(DateTime::<Utc>::from_timestamp_millis)
                            .unwrap_or_else(Utc::now);
                        Some(StockPrice::trade(symbol, price, volume as i64, timestamp))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_mapping() {
        let quote: FinnhubQuote = serde_json::from_value(serde_json::json!({
            "c": 189.5, "d": 1.5, "dp": 0.8, "h": 190.0, "l": 186.0,
            "o": 187.0, "pc": 188.0, "t": 1700000000
        }))
        .unwrap();

        let price = quote.into_price("AAPL", Utc::now()).unwrap();
        assert_eq!(price.ticker, "AAPL");
        assert_eq!(price.price, 189.5);
        assert_eq!(price.volume, 0);
        assert_eq!(price.change_percent, Some(0.8));
        assert_eq!(price.close, Some(188.0));
    }

    #[test]
    fn test_zero_price_means_no_data() {
        let quote: FinnhubQuote = serde_json::from_value(serde_json::json!({
            "c": 0, "d": null, "dp": null, "h": 0, "l": 0, "o": 0, "pc": 0
        }))
        .unwrap();
        assert!(quote.into_price("NOPE", Utc::now()).is_none());
    }

    #[test]
    fn test_trade_frames_parse() {
        let frame = r#"{"type":"trade","data":[
            {"s":"AAPL","p":190.1,"v":100,"t":1700000000000},
            {"s":"MSFT","p":370.0,"v":5,"t":1700000000500},
            {"s":"BAD"}
        ]}"#;

        let prices = FinnhubFeed.parse(frame);
        assert_eq!(prices.len(), 2);
        assert_eq!(prices[0].ticker, "AAPL");
        assert_eq!(prices[0].volume, 100);
        assert_eq!(prices[0].timestamp.timestamp_millis(), 1_700_000_000_000);

        assert!(FinnhubFeed.parse(r#"{"type":"ping"}"#).is_empty());
        assert!(FinnhubFeed.parse("not json").is_empty());
    }

    #[test]
    fn test_subscribe_frames_per_symbol() {
        let frames = FinnhubFeed.subscribe_frames(&["AAPL".to_string(), "TSLA".to_string()]);
        assert_eq!(frames.len(), 2);
        assert!(frames[1].contains(r#""symbol":"TSLA""#));
        assert!(frames[0].contains(r#""type":"subscribe""#));
    }
}
