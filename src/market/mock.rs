//! Random quotes for development and tests

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::collections::HashSet;
use tokio::sync::{broadcast, RwLock};
use tracing::info;

use super::MarketDataProvider;
use crate::models::StockPrice;
use crate::Result;

pub struct MockProvider {
    tx: broadcast::Sender<StockPrice>,
    subscribed: RwLock<HashSet<String>>,
}

impl MockProvider {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            tx,
            subscribed: RwLock::new(HashSet::new()),
        }
    }

    pub async fn subscribed(&self) -> HashSet<String> {
        self.subscribed.read().await.clone()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn connect(&self) -> Result<()> {
        info!("Connected to Mock Provider");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        info!("Disconnected from Mock Provider");
        Ok(())
    }

    async fn subscribe(&self, tickers: &[String]) -> Result<()> {
        self.subscribed.write().await.extend(tickers.iter().cloned());
        info!("Mock: Subscribed to {:?}", tickers);
        Ok(())
    }

    async fn unsubscribe(&self, tickers: &[String]) -> Result<()> {
        let mut subscribed = self.subscribed.write().await;
        for ticker in tickers {
            subscribed.remove(ticker);
        }
        info!("Mock: Unsubscribed from {:?}", tickers);
        Ok(())
    }

    async fn latest_quote(&self, ticker: &str) -> Result<Option<StockPrice>> {
        Ok(Some(random_quote(ticker)))
    }

    fn price_feed(&self) -> broadcast::Receiver<StockPrice> {
        self.tx.subscribe()
    }
}

/// Random but internally consistent quote (open/high/low/close all set)
pub fn random_quote(ticker: &str) -> StockPrice {
    let mut rng = rand::thread_rng();

    let price = round2(rng.gen_range(100.0..500.0));
    let change = round2(rng.gen_range(-5.0..5.0));
    let change_percent = round2(rng.gen_range(-2.0..2.0));
    let open = round2(price - change);
    let high = round2(price.max(open) + rng.gen_range(0.0..2.0));
    let low = round2(price.min(open) - rng.gen_range(0.0..2.0));

    StockPrice {
        ticker: ticker.to_string(),
        price,
        volume: rng.gen_range(1000..100000),
        timestamp: Utc::now(),
        change: Some(change),
        change_percent: Some(change_percent),
        open: Some(open),
        high: Some(high),
        low: Some(low),
        close: Some(open),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_quote_ranges() {
        for _ in 0..50 {
            let quote = random_quote("AAPL");
            assert!((100.0..=500.0).contains(&quote.price));
            assert!((1000..100000).contains(&quote.volume));
            assert!(quote.change.unwrap().abs() <= 5.0);
            assert!(quote.change_percent.unwrap().abs() <= 2.0);

            let (high, low) = (quote.high.unwrap(), quote.low.unwrap());
            assert!(high >= quote.price && low <= quote.price);
            assert!(quote.open.unwrap() > 0.0);
        }
    }

    #[tokio::test]
    async fn test_subscription_tracking() {
        let provider = MockProvider::new();
        provider
            .subscribe(&["AAPL".to_string(), "MSFT".to_string()])
            .await
            .unwrap();
        provider.unsubscribe(&["AAPL".to_string()]).await.unwrap();

        let subscribed = provider.subscribed().await;
        assert_eq!(subscribed.len(), 1);
        assert!(subscribed.contains("MSFT"));

        let quote = provider.latest_quote("MSFT").await.unwrap().unwrap();
        assert_eq!(quote.ticker, "MSFT");
    }
}
