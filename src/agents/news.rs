//! News sentiment analysis

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use super::{extract_confidence, extract_sentiment, short_error, AgentProfile};
use crate::gemini::LanguageModel;
use crate::models::Sentiment;
use crate::news::{simple_sentiment, Article, KeywordSentiment, NewsProvider};

const DEFAULT_CONFIDENCE: f64 = 0.65;
const ARTICLES_FETCHED: u32 = 15;
const ARTICLES_SUMMARIZED: usize = 10;
const DESCRIPTION_CHARS: usize = 150;

pub const PROFILE: AgentProfile = AgentProfile {
    name: "News & Sentiment Analyst",
    description: "Specialized in analyzing financial news and market sentiment",
    instructions: &[
        "Analyze news articles for market impact",
        "Evaluate sentiment (bullish, bearish, neutral)",
        "Identify key themes and narratives",
        "Assess credibility and relevance of sources",
        "Provide balanced, objective analysis",
        "Consider both short-term and long-term implications",
    ],
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsSentiment {
    pub ticker: String,
    pub sentiment: Sentiment,
    pub confidence: f64,
    pub summary: String,
    pub article_count: usize,
    pub reasoning: String,
    /// Keyword score over the fetched headlines
    pub headline_sentiment: Option<KeywordSentiment>,
    pub error: Option<String>,
}

pub struct NewsSentimentAgent {
    llm: Arc<dyn LanguageModel>,
    news: Arc<dyn NewsProvider>,
}

impl NewsSentimentAgent {
    pub fn new(llm: Arc<dyn LanguageModel>, news: Arc<dyn NewsProvider>) -> Self {
        Self { llm, news }
    }

    pub async fn analyze_news_sentiment(&self, ticker: &str, days_back: u32) -> NewsSentiment {
        let articles = match self.news.stock_news(ticker, days_back, ARTICLES_FETCHED).await {
            Ok(articles) => articles,
            Err(e) => {
                error!("News fetch failed for {}: {}", ticker, e);
                Vec::new()
            }
        };

        if articles.is_empty() {
            info!("No recent news for {}", ticker);
            return NewsSentiment {
                ticker: ticker.to_string(),
                sentiment: Sentiment::Neutral,
                confidence: 0.3,
                summary: "Insufficient news data for analysis".to_string(),
                article_count: 0,
                reasoning: "No recent articles were available".to_string(),
                headline_sentiment: None,
                error: None,
            };
        }

        let headlines: Vec<&str> = articles.iter().filter_map(|a| a.title.as_deref()).collect();
        let headline_sentiment = simple_sentiment(&headlines.join(" "));

        let prompt = format!(
            r#"
Analyze the following recent news articles for {ticker}:

{summary}

Provide a sentiment analysis including:
1. Overall sentiment (bullish/bearish/neutral)
2. Key themes and narratives
3. Potential market impact
4. Confidence level (0-1)
5. Notable concerns or opportunities

Keep your response concise and actionable (under 250 words).
"#,
            ticker = ticker,
            summary = summarize_articles(&articles),
        );

        match self.llm.generate(&PROFILE.system_prompt(), &prompt).await {
            Ok(text) => NewsSentiment {
                ticker: ticker.to_string(),
                sentiment: extract_sentiment(&text),
                confidence: extract_confidence(&text, DEFAULT_CONFIDENCE),
                summary: text,
                article_count: articles.len(),
                reasoning: "Analysis based on recent news articles and market narratives".to_string(),
                headline_sentiment: Some(headline_sentiment),
                error: None,
            },
            Err(e) => {
                error!("News agent analysis error for {}: {}", ticker, e);
                NewsSentiment {
                    ticker: ticker.to_string(),
                    sentiment: Sentiment::Neutral,
                    confidence: 0.0,
                    summary: format!("Unable to analyze news sentiment: {}", short_error(&e)),
                    article_count: articles.len(),
                    reasoning: "News analysis failed due to API error".to_string(),
                    headline_sentiment: Some(headline_sentiment),
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// `i. [source] title` followed by a shortened description, first ten articles
fn summarize_articles(articles: &[Article]) -> String {
    articles
        .iter()
        .take(ARTICLES_SUMMARIZED)
        .enumerate()
        .map(|(i, article)| {
            let description: String = article
                .description
                .as_deref()
                .unwrap_or("")
                .chars()
                .take(DESCRIPTION_CHARS)
                .collect();

            format!(
                "{}. [{}] {}\n   {}...",
                i + 1,
                article.source.as_deref().unwrap_or("Unknown"),
                article.title.as_deref().unwrap_or(""),
                description
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
