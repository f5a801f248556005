//! Price action analysis

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, warn};

use super::{extract_confidence, short_error, AgentProfile};
use crate::gemini::LanguageModel;
use crate::market::StockStreamManager;
use crate::models::StockPrice;

const DEFAULT_CONFIDENCE: f64 = 0.7;

pub const PROFILE: AgentProfile = AgentProfile {
    name: "Comprehensive Market Analyst",
    description: "Expert in comprehensive stock analysis including price action, technical indicators, volume analysis, and risk assessment",
    instructions: &[
        "Provide DETAILED analysis with specific insights and actionable information",
        "Analyze price trends, support/resistance levels, and volume patterns",
        "Evaluate momentum indicators and trend strength",
        "Include risk factors and volatility analysis",
        "Provide clear, structured explanations with bullet points",
        "Use professional financial terminology",
        "Always be specific with numbers and percentages",
        "Give both short-term and longer-term perspectives",
        "Focus on factual, data-driven analysis with comprehensive reasoning",
    ],
};

/// Quote plus the intraday metrics derived from it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceData {
    pub current_price: f64,
    pub volume: i64,
    pub change: f64,
    pub change_percent: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub price_range: f64,
    pub volatility_pct: f64,
    pub intraday_trend: String,
}

impl PriceData {
    pub fn from_quote(quote: &StockPrice) -> Self {
        let open = quote.open.unwrap_or(0.0);
        let high = quote.high.unwrap_or(quote.price);
        let low = quote.low.unwrap_or(quote.price);

        let volatility_pct = if open > 0.0 {
            (high - low) / open * 100.0
        } else {
            0.0
        };

        Self {
            current_price: quote.price,
            volume: quote.volume,
            change: quote.change.unwrap_or(0.0),
            change_percent: quote.change_percent.unwrap_or(0.0),
            open,
            high,
            low,
            price_range: high - low,
            volatility_pct,
            intraday_trend: if quote.price > open { "bullish" } else { "bearish" }.to_string(),
        }
    }

    fn field_count(&self) -> usize {
        serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_object().map(|o| o.len()))
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketAnalysis {
    pub ticker: String,
    pub analysis: String,
    pub confidence: f64,
    pub data_points_analyzed: usize,
    pub reasoning: String,
    pub error: Option<String>,
}

pub struct MarketDataAgent {
    llm: Arc<dyn LanguageModel>,
}

impl MarketDataAgent {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    pub async fn analyze_price_action(&self, ticker: &str, price_data: &PriceData) -> MarketAnalysis {
        let prompt = format!(
            r#"
Analyze the following price data for {ticker}:

Current Price: ${price:.2}
Change: {change:.2} ({change_percent:.2}%)
Volume: {volume}
Open: ${open:.2}
High: ${high:.2}
Low: ${low:.2}

Provide a concise technical analysis including:
1. Price trend (bullish/bearish/neutral)
2. Volume analysis
3. Key support/resistance levels if apparent
4. Overall market strength indicator
5. Your confidence level (0-1)

Keep your response structured and under 200 words.
"#,
            ticker = ticker,
            price = price_data.current_price,
            change = price_data.change,
            change_percent = price_data.change_percent,
            volume = price_data.volume,
            open = price_data.open,
            high = price_data.high,
            low = price_data.low,
        );

        match self.llm.generate(&PROFILE.system_prompt(), &prompt).await {
            Ok(text) => MarketAnalysis {
                ticker: ticker.to_string(),
                confidence: extract_confidence(&text, DEFAULT_CONFIDENCE),
                analysis: text,
                data_points_analyzed: price_data.field_count(),
                reasoning: "Technical analysis based on price, volume, and trend patterns".to_string(),
                error: None,
            },
            Err(e) => {
                error!("Market agent analysis error for {}: {}", ticker, e);
                MarketAnalysis {
                    ticker: ticker.to_string(),
                    analysis: format!("Unable to perform analysis: {}", short_error(&e)),
                    confidence: 0.0,
                    data_points_analyzed: 0,
                    reasoning: "Analysis failed due to API error".to_string(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Compact quote view for several tickers; tickers without data are left out
    pub async fn market_snapshot(
        &self,
        manager: &StockStreamManager,
        tickers: &[String],
    ) -> BTreeMap<String, serde_json::Value> {
        let mut snapshots = BTreeMap::new();

        for ticker in tickers {
            match manager.get_quote(ticker).await {
                Ok(Some(quote)) => {
                    snapshots.insert(ticker.clone(), quote.snapshot_json());
                }
                Ok(None) => {}
                Err(e) => warn!("Snapshot quote failed for {}: {}", ticker, e),
            }
        }

        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{quote, FixedQuoteProvider, ScriptedModel};

    #[test]
    fn test_price_data_metrics() {
        let data = PriceData::from_quote(&quote("AAPL", 105.0, 100.0, 108.0, 98.0, 5.0));
        assert_eq!(data.price_range, 10.0);
        assert_eq!(data.volatility_pct, 10.0);
        assert_eq!(data.intraday_trend, "bullish");
        assert_eq!(data.field_count(), 10);

        let data = PriceData::from_quote(&quote("AAPL", 95.0, 0.0, 96.0, 94.0, -1.0));
        assert_eq!(data.volatility_pct, 0.0);
        assert_eq!(data.intraday_trend, "bearish");
    }

    #[tokio::test]
    async fn test_analysis_extracts_confidence() {
        let llm = Arc::new(ScriptedModel::always("Bullish trend. Confidence: 0.82"));
        let agent = MarketDataAgent::new(llm.clone());
        let data = PriceData::from_quote(&quote("AAPL", 105.0, 100.0, 108.0, 98.0, 5.0));

        let result = agent.analyze_price_action("AAPL", &data).await;
        assert_eq!(result.confidence, 0.82);
        assert_eq!(result.data_points_analyzed, 10);
        assert!(result.error.is_none());

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].0.contains("Comprehensive Market Analyst"));
        assert!(prompts[0].1.contains("Current Price: $105.00"));
    }

    #[tokio::test]
    async fn test_llm_failure_becomes_placeholder() {
        let agent = MarketDataAgent::new(Arc::new(ScriptedModel::failing("quota exceeded")));
        let data = PriceData::from_quote(&quote("AAPL", 105.0, 100.0, 108.0, 98.0, 5.0));

        let result = agent.analyze_price_action("AAPL", &data).await;
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.analysis, "Unable to perform analysis: LLM error: quota exceeded");
        assert_eq!(result.reasoning, "Analysis failed due to API error");
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_snapshot_skips_missing_quotes() {
        let provider = FixedQuoteProvider::new(vec![quote("MSFT", 400.0, 398.0, 402.0, 397.0, 0.5)]);
        let manager = StockStreamManager::new(Arc::new(provider));
        let agent = MarketDataAgent::new(Arc::new(ScriptedModel::always("")));

        let snapshot = agent
            .market_snapshot(&manager, &["MSFT".to_string(), "NOPE".to_string()])
            .await;

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["MSFT"]["price"], 400.0);
        assert_eq!(snapshot["MSFT"]["change_percent"], 0.5);
    }
}
