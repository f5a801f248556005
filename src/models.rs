//! Core data models shared by the routes, agents and orchestrator

use crate::error::PlatformError;
use crate::Result;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_SUBSCRIPTION_TICKERS: usize = 20;
pub const MAX_QUERY_TICKERS: usize = 10;
pub const MAX_TICKER_LEN: usize = 20;
pub const MAX_NOTES_LEN: usize = 500;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    #[value(name = "market_analysis", alias = "market")]
    MarketAnalysis,
    #[value(name = "news_sentiment", alias = "news")]
    NewsSentiment,
    #[value(name = "risk_assessment", alias = "risk")]
    RiskAssessment,
    #[value(name = "decision_synthesis", alias = "decision")]
    DecisionSynthesis,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::MarketAnalysis => "market_analysis",
            QueryType::NewsSentiment => "news_sentiment",
            QueryType::RiskAssessment => "risk_assessment",
            QueryType::DecisionSynthesis => "decision_synthesis",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RiskLabel {
    Low,
    Medium,
    High,
    Unknown,
}

impl RiskLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLabel::Low => "low",
            RiskLabel::Medium => "medium",
            RiskLabel::High => "high",
            RiskLabel::Unknown => "unknown",
        }
    }

    pub fn from_label(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "low" => RiskLabel::Low,
            "medium" => RiskLabel::Medium,
            "high" => RiskLabel::High,
            _ => RiskLabel::Unknown,
        }
    }
}

impl fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Bullish => "bullish",
            Sentiment::Bearish => "bearish",
            Sentiment::Neutral => "neutral",
        }
    }

    /// One-line reading of what the sentiment implies for price action
    pub fn interpretation(&self) -> &'static str {
        match self {
            Sentiment::Bullish => "Positive news flow may support upward price momentum.",
            Sentiment::Bearish => "Negative coverage could create downward pressure.",
            Sentiment::Neutral => "Mixed signals suggest waiting for clearer direction.",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ================= Market Data =================
//

/// Normalized quote returned by every market data provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockPrice {
    pub ticker: String,
    pub price: f64,
    pub volume: i64,
    pub timestamp: DateTime<Utc>,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
}

impl StockPrice {
    /// Bare trade print without session statistics
    pub fn trade(ticker: impl Into<String>, price: f64, volume: i64, timestamp: DateTime<Utc>) -> Self {
        Self {
            ticker: ticker.into(),
            price,
            volume,
            timestamp,
            change: None,
            change_percent: None,
            open: None,
            high: None,
            low: None,
            close: None,
        }
    }

    /// Compact form pushed over the quote stream and used by snapshots
    pub fn snapshot_json(&self) -> serde_json::Value {
        serde_json::json!({
            "price": self.price,
            "volume": self.volume,
            "change": self.change,
            "change_percent": self.change_percent,
            "timestamp": self.timestamp.to_rfc3339(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerSubscription {
    pub tickers: Vec<String>,
}

impl TickerSubscription {
    pub fn validate(&self) -> Result<()> {
        validate_ticker_list(&self.tickers, MAX_SUBSCRIPTION_TICKERS)
    }
}

//
// ================= Watchlist =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistCreate {
    pub ticker: String,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub alert_threshold: Option<serde_json::Value>,
}

impl WatchlistCreate {
    pub fn validate(&self) -> Result<()> {
        let ticker = self.ticker.trim();
        if ticker.is_empty() || ticker.chars().count() > MAX_TICKER_LEN {
            return Err(PlatformError::Validation(format!(
                "ticker must be between 1 and {} characters",
                MAX_TICKER_LEN
            )));
        }

        if let Some(notes) = &self.notes {
            if notes.chars().count() > MAX_NOTES_LEN {
                return Err(PlatformError::Validation(format!(
                    "notes must be at most {} characters",
                    MAX_NOTES_LEN
                )));
            }
        }

        if let Some(threshold) = &self.alert_threshold {
            if !threshold.is_object() {
                return Err(PlatformError::Validation(
                    "alert_threshold must be a JSON object".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn normalized_ticker(&self) -> String {
        self.ticker.trim().to_uppercase()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchlistItem {
    pub id: i64,
    pub user_id: i64,
    pub ticker: String,
    pub company_name: Option<String>,
    pub notes: Option<String>,
    pub alert_threshold: Option<serde_json::Value>,
    pub added_at: DateTime<Utc>,
}

//
// ================= AI Queries =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIQueryRequest {
    pub tickers: Vec<String>,
    pub query_type: QueryType,
    #[serde(default)]
    pub additional_context: Option<String>,
}

impl AIQueryRequest {
    pub fn validate(&self) -> Result<()> {
        validate_ticker_list(&self.tickers, MAX_QUERY_TICKERS)
    }

    /// Tickers trimmed and upper-cased, blanks dropped
    pub fn normalized_tickers(&self) -> Vec<String> {
        self.tickers
            .iter()
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

/// Output of a single agent for a single ticker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentInsight {
    pub agent_name: String,
    pub confidence: f64,
    pub summary: String,
    pub details: serde_json::Value,
    pub reasoning: String,
}

impl AgentInsight {
    pub fn new(
        agent_name: impl Into<String>,
        confidence: f64,
        summary: impl Into<String>,
        details: serde_json::Value,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            confidence: clamp_confidence(confidence),
            summary: summary.into(),
            details,
            reasoning: reasoning.into(),
        }
    }

    /// Risk label carried in `details.risk_level`, if any
    pub fn risk_level(&self) -> RiskLabel {
        self.details
            .get("risk_level")
            .and_then(|v| v.as_str())
            .map(RiskLabel::from_label)
            .unwrap_or(RiskLabel::Unknown)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIQueryResponse {
    pub query_id: i64,
    pub query_type: QueryType,
    pub tickers: Vec<String>,
    pub insights: Vec<AgentInsight>,
    pub synthesis: String,
    pub risk_level: RiskLabel,
    pub execution_time_ms: i64,
    pub timestamp: DateTime<Utc>,
}

//
// ================= Helpers =================
//

pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn validate_ticker_list(tickers: &[String], max: usize) -> Result<()> {
    if tickers.is_empty() || tickers.len() > max {
        return Err(PlatformError::Validation(format!(
            "tickers must contain between 1 and {} items",
            max
        )));
    }

    if let Some(bad) = tickers
        .iter()
        .find(|t| t.trim().is_empty() || t.trim().chars().count() > MAX_TICKER_LEN)
    {
        return Err(PlatformError::Validation(format!("invalid ticker: '{}'", bad)));
    }

    Ok(())
}
