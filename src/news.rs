//! NewsAPI client and keyword sentiment scoring

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use crate::Result;

const NEWS_API_URL: &str = "https://newsapi.org/v2";
const CONTENT_LIMIT: usize = 500;

const POSITIVE_WORDS: &[&str] = &[
    "growth", "profit", "gain", "surge", "rally", "bullish", "positive", "strong", "beat",
    "outperform", "success",
];

const NEGATIVE_WORDS: &[&str] = &[
    "loss", "decline", "fall", "drop", "bearish", "negative", "weak", "miss", "underperform",
    "risk", "concern",
];

/// Normalized news article
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Article {
    pub title: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
    pub url: Option<String>,
    pub published_at: Option<String>,
    pub content: String,
}

#[async_trait]
pub trait NewsProvider: Send + Sync {
    /// Articles matching `query` from the last `days_back` days
    async fn stock_news(&self, query: &str, days_back: u32, max_articles: u32) -> Result<Vec<Article>>;

    /// Top headlines for a category
    async fn market_news(&self, category: &str, max_articles: u32) -> Result<Vec<Article>>;
}

pub struct NewsApiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl NewsApiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(20))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: NEWS_API_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// GET an endpoint and normalize its `articles`; every failure yields `[]`
    async fn fetch(&self, endpoint: &str, params: &[(&str, String)], what: &str) -> Vec<Article> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint);

        let response = match self
            .client
            .get(&url)
            .header("User-Agent", "financial-ai-platform")
            .query(params)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("Error fetching news for {}: {}", what, e);
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            error!("News API error: {} ({})", response.status(), what);
            return Vec::new();
        }

        match response.json::<NewsApiResponse>().await {
            Ok(body) => {
                let articles: Vec<Article> = body.articles.into_iter().map(Article::from).collect();
                debug!("News API returned {} articles for {}", articles.len(), what);
                articles
            }
            Err(e) => {
                error!("Failed to parse News API response for {}: {}", what, e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl NewsProvider for NewsApiClient {
    async fn stock_news(&self, query: &str, days_back: u32, max_articles: u32) -> Result<Vec<Article>> {
        let from = (Utc::now() - ChronoDuration::days(days_back as i64))
            .format("%Y-%m-%d")
            .to_string();

        let params = [
            ("q", query.to_string()),
            ("from", from),
            ("sortBy", "relevancy".to_string()),
            ("pageSize", max_articles.to_string()),
            ("apiKey", self.api_key.clone()),
            ("language", "en".to_string()),
        ];

        Ok(self.fetch("everything", &params, query).await)
    }

    async fn market_news(&self, category: &str, max_articles: u32) -> Result<Vec<Article>> {
        let params = [
            ("category", category.to_string()),
            ("pageSize", max_articles.to_string()),
            ("apiKey", self.api_key.clone()),
            ("country", "us".to_string()),
        ];

        Ok(self.fetch("top-headlines", &params, category).await)
    }
}

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    #[serde(default)]
    articles: Vec<RawArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArticle {
    title: Option<String>,
    description: Option<String>,
    source: Option<RawSource>,
    url: Option<String>,
    published_at: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    name: Option<String>,
}

impl From<RawArticle> for Article {
    fn from(raw: RawArticle) -> Self {
        Self {
            title: raw.title,
            description: raw.description,
            source: raw.source.and_then(|s| s.name),
            url: raw.url,
            published_at: raw.published_at,
            content: raw
                .content
                .map(|c| c.chars().take(CONTENT_LIMIT).collect())
                .unwrap_or_default(),
        }
    }
}

/// Keyword sentiment of a piece of text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordSentiment {
    pub score: f64,
    pub label: String,
    pub positive_mentions: usize,
    pub negative_mentions: usize,
}

pub fn simple_sentiment(text: &str) -> KeywordSentiment {
    let lower = text.to_lowercase();
    let positive = POSITIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
    let negative = NEGATIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();

    let total = positive + negative;
    let score = if total == 0 {
        0.0
    } else {
        (positive as f64 - negative as f64) / total as f64
    };

    let label = if score > 0.2 {
        "positive"
    } else if score < -0.2 {
        "negative"
    } else {
        "neutral"
    };

    KeywordSentiment {
        score,
        label: label.to_string(),
        positive_mentions: positive,
        negative_mentions: negative,
    }
}

/// Search query used for a named topic
pub fn topic_query(topic: &str) -> String {
    match topic.to_lowercase().as_str() {
        "stocks" => "stock market",
        "crypto" => "cryptocurrency bitcoin ethereum",
        "bitcoin" => "bitcoin BTC",
        "ethereum" => "ethereum ETH",
        "forex" => "forex currency exchange",
        "commodities" => "commodities gold oil",
        "gold" => "gold commodity",
        "oil" => "crude oil",
        "tech" => "technology stocks",
        "finance" => "finance financial markets",
        _ => topic,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_article_normalization() {
        let raw: RawArticle = serde_json::from_value(serde_json::json!({
            "source": {"id": null, "name": "Reuters"},
            "title": "Apple beats estimates",
            "description": "Strong quarter",
            "url": "https://example.com/a",
            "publishedAt": "2024-03-01T12:00:00Z",
            "content": "x".repeat(800)
        }))
        .unwrap();

        let article = Article::from(raw);
        assert_eq!(article.source.as_deref(), Some("Reuters"));
        assert_eq!(article.published_at.as_deref(), Some("2024-03-01T12:00:00Z"));
        assert_eq!(article.content.chars().count(), CONTENT_LIMIT);

        let bare: RawArticle = serde_json::from_value(serde_json::json!({"title": "t"})).unwrap();
        let article = Article::from(bare);
        assert!(article.source.is_none());
        assert!(article.content.is_empty());
    }

    #[test]
    fn test_simple_sentiment() {
        let s = simple_sentiment("Strong growth and a profit surge");
        assert_eq!(s.label, "positive");
        assert_eq!(s.positive_mentions, 4);
        assert_eq!(s.score, 1.0);

        let s = simple_sentiment("Shares drop on weak guidance, analysts voice concern");
        assert_eq!(s.label, "negative");

        let s = simple_sentiment("Strong quarter despite one concern");
        assert_eq!(s.label, "neutral");
        assert_eq!(s.score, 0.0);

        let s = simple_sentiment("Company holds annual meeting");
        assert_eq!(s.score, 0.0);
        assert_eq!(s.label, "neutral");
    }

    #[test]
    fn test_topic_query() {
        assert_eq!(topic_query("Crypto"), "cryptocurrency bitcoin ethereum");
        assert_eq!(topic_query("oil"), "crude oil");
        assert_eq!(topic_query("semiconductors"), "semiconductors");
    }

    #[tokio::test]
    async fn test_unreachable_api_yields_empty_list() {
        let client = NewsApiClient::new("key")
            .unwrap()
            .with_base_url("http://127.0.0.1:1/v2");

        let articles = client.stock_news("AAPL", 7, 5).await.unwrap();
        assert!(articles.is_empty());

        let articles = client.market_news("business", 5).await.unwrap();
        assert!(articles.is_empty());
    }
}
