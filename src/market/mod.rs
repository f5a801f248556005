//! Market data providers and the per-user subscription registry

pub mod alpaca;
pub mod finnhub;
pub mod mock;
pub mod stream;

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::models::StockPrice;
use crate::Result;

pub use alpaca::AlpacaProvider;
pub use finnhub::FinnhubProvider;
pub use mock::MockProvider;

/// Source of quotes, REST-polled and optionally streamed
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    async fn subscribe(&self, tickers: &[String]) -> Result<()>;

    async fn unsubscribe(&self, tickers: &[String]) -> Result<()>;

    /// Latest quote, `None` when the provider has no data for the ticker
    async fn latest_quote(&self, ticker: &str) -> Result<Option<StockPrice>>;

    /// Live prices for subscribed tickers
    fn price_feed(&self) -> broadcast::Receiver<StockPrice>;
}

/// Build the provider named by `MARKET_DATA_PROVIDER`
pub fn build_provider(settings: &Settings) -> Result<Arc<dyn MarketDataProvider>> {
    let provider: Arc<dyn MarketDataProvider> = match settings.market_data_provider.as_str() {
        "alpaca" => Arc::new(AlpacaProvider::new(
            settings.market_data_api_key.clone(),
            settings.market_data_secret_key.clone().unwrap_or_default(),
        )?),
        "finnhub" => Arc::new(FinnhubProvider::new(settings.market_data_api_key.clone())?),
        "mock" => Arc::new(MockProvider::new()),
        other => {
            warn!("Unknown provider {}, using Mock", other);
            Arc::new(MockProvider::new())
        }
    };

    info!("Market data provider: {}", provider.name());
    Ok(provider)
}

/// Tracks which tickers each user streams and forwards changes to the provider
pub struct StockStreamManager {
    provider: Arc<dyn MarketDataProvider>,
    subscriptions: RwLock<HashMap<String, HashSet<String>>>,
    /// Tickers the provider accepted; held across provider calls
    forwarded: Mutex<HashSet<String>>,
}

impl StockStreamManager {
    pub fn new(provider: Arc<dyn MarketDataProvider>) -> Self {
        Self {
            provider,
            subscriptions: RwLock::new(HashMap::new()),
            forwarded: Mutex::new(HashSet::new()),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Add tickers for a user; returns the ones that were new for that user.
    /// A provider failure is logged and the registry is still updated;
    /// the rejected tickers are offered again on the next subscribe.
    pub async fn subscribe_user(&self, user_id: &str, tickers: &[String]) -> Vec<String> {
        let requested = normalize(tickers);

        let mut subscriptions = self.subscriptions.write().await;
        let user_set = subscriptions.entry(user_id.to_string()).or_default();

        let added: Vec<String> = requested
            .iter()
            .filter(|t| user_set.insert((*t).clone()))
            .cloned()
            .collect();

        if user_set.is_empty() {
            subscriptions.remove(user_id);
        }
        drop(subscriptions);

        let mut forwarded = self.forwarded.lock().await;
        let for_provider: Vec<String> = requested
            .into_iter()
            .filter(|t| !forwarded.contains(t))
            .collect();

        if !for_provider.is_empty() {
            match self.provider.subscribe(&for_provider).await {
                Ok(()) => forwarded.extend(for_provider),
                Err(e) => error!("Provider subscribe failed for {:?}: {}", for_provider, e),
            }
        }

        added
    }

    /// Remove tickers for a user (`None` = everything). Unknown users are a no-op.
    pub async fn unsubscribe_user(&self, user_id: &str, tickers: Option<&[String]>) -> Vec<String> {
        let mut subscriptions = self.subscriptions.write().await;

        let Some(user_set) = subscriptions.get_mut(user_id) else {
            return Vec::new();
        };

        let requested = match tickers {
            Some(list) => normalize(list),
            None => user_set.iter().cloned().collect(),
        };

        let removed: Vec<String> = requested
            .into_iter()
            .filter(|t| user_set.remove(t))
            .collect();

        if user_set.is_empty() {
            subscriptions.remove(user_id);
        }

        let still_held: HashSet<&String> = subscriptions.values().flatten().collect();
        let released: Vec<String> = removed
            .iter()
            .filter(|t| !still_held.contains(t))
            .cloned()
            .collect();
        drop(subscriptions);

        let mut forwarded = self.forwarded.lock().await;
        let for_provider: Vec<String> = released
            .into_iter()
            .filter(|t| forwarded.contains(t))
            .collect();

        if !for_provider.is_empty() {
            match self.provider.unsubscribe(&for_provider).await {
                Ok(()) => {
                    for ticker in &for_provider {
                        forwarded.remove(ticker);
                    }
                }
                Err(e) => error!("Provider unsubscribe failed for {:?}: {}", for_provider, e),
            }
        }

        removed
    }

    pub async fn get_quote(&self, ticker: &str) -> Result<Option<StockPrice>> {
        self.provider.latest_quote(ticker).await
    }

    /// Sorted tickers the user is subscribed to
    pub async fn subscriptions(&self, user_id: &str) -> Vec<String> {
        let subscriptions = self.subscriptions.read().await;
        let mut tickers: Vec<String> = subscriptions
            .get(user_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        tickers.sort();
        tickers
    }

    pub fn price_feed(&self) -> broadcast::Receiver<StockPrice> {
        self.provider.price_feed()
    }

    pub async fn shutdown(&self) {
        if let Err(e) = self.provider.disconnect().await {
            warn!("Provider disconnect failed: {}", e);
        }
    }
}

fn normalize(tickers: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tickers
        .iter()
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlatformError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records forwarded tickers; the first `failures` subscribes error
    #[derive(Default)]
    struct RecordingProvider {
        subscribed: Mutex<Vec<String>>,
        unsubscribed: Mutex<Vec<String>>,
        failures: AtomicUsize,
        calls: AtomicUsize,
        tx: Option<broadcast::Sender<StockPrice>>,
    }

    impl RecordingProvider {
        fn failing_first(failures: usize) -> Self {
            Self {
                failures: AtomicUsize::new(failures),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl MarketDataProvider for RecordingProvider {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn connect(&self) -> Result<()> {
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            Ok(())
        }

        async fn subscribe(&self, tickers: &[String]) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(PlatformError::MarketData("offline".to_string()));
            }
            self.subscribed.lock().unwrap().extend(tickers.iter().cloned());
            Ok(())
        }

        async fn unsubscribe(&self, tickers: &[String]) -> Result<()> {
            self.unsubscribed.lock().unwrap().extend(tickers.iter().cloned());
            Ok(())
        }

        async fn latest_quote(&self, _ticker: &str) -> Result<Option<StockPrice>> {
            Ok(None)
        }

        fn price_feed(&self) -> broadcast::Receiver<StockPrice> {
            match &self.tx {
                Some(tx) => tx.subscribe(),
                None => broadcast::channel(1).1,
            }
        }
    }

    fn tickers(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn test_subscribe_forwards_only_new_tickers() {
        let provider = Arc::new(RecordingProvider::default());
        let manager = StockStreamManager::new(provider.clone());

        let added = manager.subscribe_user("u1", &tickers(&["aapl", "MSFT"])).await;
        assert_eq!(added, tickers(&["AAPL", "MSFT"]));

        let added = manager.subscribe_user("u1", &tickers(&["AAPL", "TSLA"])).await;
        assert_eq!(added, tickers(&["TSLA"]));

        // already streamed for u1, so nothing new goes to the provider
        manager.subscribe_user("u2", &tickers(&["AAPL"])).await;

        assert_eq!(
            *provider.subscribed.lock().unwrap(),
            tickers(&["AAPL", "MSFT", "TSLA"])
        );
        assert_eq!(manager.subscriptions("u1").await, tickers(&["AAPL", "MSFT", "TSLA"]));
        assert_eq!(manager.subscriptions("u2").await, tickers(&["AAPL"]));
    }

    #[tokio::test]
    async fn test_registry_updated_when_provider_fails() {
        let provider = Arc::new(RecordingProvider::failing_first(usize::MAX));
        let manager = StockStreamManager::new(provider);

        manager.subscribe_user("u1", &tickers(&["NVDA"])).await;
        assert_eq!(manager.subscriptions("u1").await, tickers(&["NVDA"]));
    }

    #[tokio::test]
    async fn test_rejected_ticker_is_forwarded_again() {
        let provider = Arc::new(RecordingProvider::failing_first(1));
        let manager = StockStreamManager::new(provider.clone());

        manager.subscribe_user("u1", &tickers(&["AAPL"])).await;
        assert!(provider.subscribed.lock().unwrap().is_empty());

        // another user asking for the same ticker retries it
        manager.subscribe_user("u2", &tickers(&["AAPL"])).await;
        assert_eq!(*provider.subscribed.lock().unwrap(), tickers(&["AAPL"]));

        // accepted now, so a repeat does not reach the provider
        manager.subscribe_user("u1", &tickers(&["AAPL"])).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(manager.subscriptions("u1").await, tickers(&["AAPL"]));
        assert_eq!(manager.subscriptions("u2").await, tickers(&["AAPL"]));
    }

    #[tokio::test]
    async fn test_same_user_retries_rejected_ticker() {
        let provider = Arc::new(RecordingProvider::failing_first(1));
        let manager = StockStreamManager::new(provider.clone());

        manager.subscribe_user("u1", &tickers(&["AAPL"])).await;
        let added = manager.subscribe_user("u1", &tickers(&["AAPL"])).await;

        assert!(added.is_empty());
        assert_eq!(*provider.subscribed.lock().unwrap(), tickers(&["AAPL"]));
    }

    #[tokio::test]
    async fn test_resubscribe_after_release_reaches_provider() {
        let provider = Arc::new(RecordingProvider::default());
        let manager = StockStreamManager::new(provider.clone());

        manager.subscribe_user("u1", &tickers(&["AMD"])).await;
        manager.unsubscribe_user("u1", None).await;
        manager.subscribe_user("u2", &tickers(&["AMD"])).await;

        assert_eq!(*provider.subscribed.lock().unwrap(), tickers(&["AMD", "AMD"]));
        assert_eq!(*provider.unsubscribed.lock().unwrap(), tickers(&["AMD"]));
    }

    #[tokio::test]
    async fn test_unsubscribe_all_and_unknown_user() {
        let provider = Arc::new(RecordingProvider::default());
        let manager = StockStreamManager::new(provider.clone());

        assert!(manager.unsubscribe_user("ghost", None).await.is_empty());

        manager.subscribe_user("u1", &tickers(&["AAPL", "MSFT"])).await;
        manager.subscribe_user("u2", &tickers(&["AAPL"])).await;

        let mut removed = manager.unsubscribe_user("u1", None).await;
        removed.sort();
        assert_eq!(removed, tickers(&["AAPL", "MSFT"]));
        assert!(manager.subscriptions("u1").await.is_empty());

        // AAPL is still held by u2
        assert_eq!(*provider.unsubscribed.lock().unwrap(), tickers(&["MSFT"]));

        let removed = manager.unsubscribe_user("u2", Some(&tickers(&["aapl", "GOOG"]))).await;
        assert_eq!(removed, tickers(&["AAPL"]));
        assert!(manager.subscriptions.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_price_feed_comes_from_provider() {
        let (tx, _) = broadcast::channel(4);
        let provider = Arc::new(RecordingProvider {
            tx: Some(tx.clone()),
            ..Default::default()
        });
        let manager = StockStreamManager::new(provider);

        let mut feed = manager.price_feed();
        tx.send(StockPrice::trade("AAPL", 1.0, 1, chrono::Utc::now()))
            .unwrap();
        assert_eq!(feed.recv().await.unwrap().ticker, "AAPL");
    }

    #[test]
    fn test_build_provider_falls_back_to_mock() {
        let mut settings = Settings::from_lookup(|_| None).unwrap();
        settings.market_data_provider = "bloomberg".to_string();
        assert_eq!(build_provider(&settings).unwrap().name(), "mock");

        settings.market_data_provider = "finnhub".to_string();
        assert_eq!(build_provider(&settings).unwrap().name(), "finnhub");
    }
}
