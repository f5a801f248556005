//! Offline stand-ins for the LLM, news and quote providers used by tests

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::error::PlatformError;
use crate::gemini::LanguageModel;
use crate::market::MarketDataProvider;
use crate::models::StockPrice;
use crate::news::{Article, NewsProvider};
use crate::Result;

/// Replies from a queue, then a fallback; records every prompt
pub struct ScriptedModel {
    queue: Mutex<VecDeque<std::result::Result<String, String>>>,
    fallback: std::result::Result<String, String>,
    pub prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedModel {
    pub fn always(reply: &str) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: Ok(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: Err(message.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn then(self, reply: std::result::Result<&str, &str>) -> Self {
        self.queue
            .lock()
            .unwrap()
            .push_back(reply.map(str::to_string).map_err(str::to_string));
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .unwrap()
            .push((system.to_string(), prompt.to_string()));

        let next = self
            .queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        next.map_err(PlatformError::Llm)
    }
}

/// Fixed article list
#[derive(Default)]
pub struct StaticNews {
    pub articles: Vec<Article>,
    pub queries: Mutex<Vec<String>>,
}

impl StaticNews {
    pub fn with_titles(titles: &[&str]) -> Self {
        Self {
            articles: titles.iter().map(|t| article(t)).collect(),
            queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl NewsProvider for StaticNews {
    async fn stock_news(&self, query: &str, _days_back: u32, max_articles: u32) -> Result<Vec<Article>> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.articles.iter().take(max_articles as usize).cloned().collect())
    }

    async fn market_news(&self, category: &str, max_articles: u32) -> Result<Vec<Article>> {
        self.queries.lock().unwrap().push(category.to_string());
        Ok(self.articles.iter().take(max_articles as usize).cloned().collect())
    }
}

pub fn article(title: &str) -> Article {
    Article {
        title: Some(title.to_string()),
        description: Some(format!("{} in detail", title)),
        source: Some("Wire".to_string()),
        url: Some("https://news.test/a".to_string()),
        published_at: Some("2024-03-01T12:00:00Z".to_string()),
        content: String::new(),
    }
}

/// Serves quotes from a fixed map; unknown tickers have no data
pub struct FixedQuoteProvider {
    quotes: HashMap<String, StockPrice>,
    fail: bool,
    tx: broadcast::Sender<StockPrice>,
}

impl FixedQuoteProvider {
    pub fn new(quotes: Vec<StockPrice>) -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            quotes: quotes.into_iter().map(|q| (q.ticker.clone(), q)).collect(),
            fail: false,
            tx,
        }
    }

    pub fn failing() -> Self {
        let mut provider = Self::new(Vec::new());
        provider.fail = true;
        provider
    }

    pub fn sender(&self) -> broadcast::Sender<StockPrice> {
        self.tx.clone()
    }
}

#[async_trait]
impl MarketDataProvider for FixedQuoteProvider {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn subscribe(&self, _tickers: &[String]) -> Result<()> {
        Ok(())
    }

    async fn unsubscribe(&self, _tickers: &[String]) -> Result<()> {
        Ok(())
    }

    async fn latest_quote(&self, ticker: &str) -> Result<Option<StockPrice>> {
        if self.fail {
            return Err(PlatformError::MarketData("provider offline".to_string()));
        }
        Ok(self.quotes.get(ticker).cloned())
    }

    fn price_feed(&self) -> broadcast::Receiver<StockPrice> {
        self.tx.subscribe()
    }
}

/// Quote with explicit session numbers
pub fn quote(ticker: &str, price: f64, open: f64, high: f64, low: f64, change_percent: f64) -> StockPrice {
    StockPrice {
        ticker: ticker.to_string(),
        price,
        volume: 1_000_000,
        timestamp: Utc::now(),
        change: Some(price - open),
        change_percent: Some(change_percent),
        open: Some(open),
        high: Some(high),
        low: Some(low),
        close: Some(open),
    }
}
