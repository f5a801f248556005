//! Sequential agent orchestration per AI query
//!
//! Tickers run one after another; within a ticker the agents run in the
//! order their inputs require. Agent failures arrive as placeholders and are
//! kept as insights. A provider error aborts the whole query and yields the
//! "temporarily unavailable" response instead.

use chrono::Utc;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::agents::{
    decision, market, news, risk, DecisionAgent, MarketDataAgent, NewsSentimentAgent, PriceData,
    RiskAgent,
};
use crate::gemini::LanguageModel;
use crate::market::StockStreamManager;
use crate::models::{AIQueryRequest, AIQueryResponse, AgentInsight, QueryType, RiskLabel, StockPrice};
use crate::news::NewsProvider;
use crate::Result;

pub const UNAVAILABLE_SYNTHESIS: &str =
    "AI Analysis temporarily unavailable. Please check your API quota or try again later.";
pub const NO_INSIGHTS: &str = "No insights generated";

const NEWS_AGENT_NAME: &str = "News Sentiment Analyst";
const NEWS_DAYS_BACK: u32 = 7;

pub struct AgentOrchestrationService {
    manager: Arc<StockStreamManager>,
    market: MarketDataAgent,
    news: NewsSentimentAgent,
    risk: RiskAgent,
    decision: DecisionAgent,
}

impl AgentOrchestrationService {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        news: Arc<dyn NewsProvider>,
        manager: Arc<StockStreamManager>,
    ) -> Self {
        Self {
            manager,
            market: MarketDataAgent::new(llm.clone()),
            news: NewsSentimentAgent::new(llm.clone(), news),
            risk: RiskAgent::new(llm.clone()),
            decision: DecisionAgent::new(llm),
        }
    }

    pub fn manager(&self) -> &Arc<StockStreamManager> {
        &self.manager
    }

    /// Compact quotes for the given tickers
    pub async fn market_snapshot(&self, tickers: &[String]) -> BTreeMap<String, serde_json::Value> {
        self.market.market_snapshot(&self.manager, tickers).await
    }

    /// Run every requested ticker through the agents for the query type.
    /// `query_id` is provisional (0) until the caller persists the record.
    pub async fn execute_query(&self, request: &AIQueryRequest) -> Result<AIQueryResponse> {
        let start = Instant::now();
        let tickers = request.normalized_tickers();

        info!(
            query_type = %request.query_type,
            tickers = ?tickers,
            "Executing AI query"
        );

        let outcome = match request.query_type {
            QueryType::MarketAnalysis => self.run_market_analysis(&tickers).await,
            QueryType::NewsSentiment => self.run_news_sentiment(&tickers).await,
            QueryType::RiskAssessment => self.run_risk_assessment(&tickers).await,
            QueryType::DecisionSynthesis => self.run_decision_synthesis(&tickers).await,
        };

        let insights = match outcome {
            Ok(insights) => insights,
            Err(e) => {
                error!("Agent execution error: {}", e);
                return Ok(AIQueryResponse {
                    query_id: 0,
                    query_type: request.query_type,
                    tickers,
                    insights: Vec::new(),
                    synthesis: UNAVAILABLE_SYNTHESIS.to_string(),
                    risk_level: RiskLabel::Unknown,
                    execution_time_ms: elapsed_ms(start),
                    timestamp: Utc::now(),
                });
            }
        };

        let synthesis = insights
            .last()
            .map(|i| i.summary.clone())
            .unwrap_or_else(|| NO_INSIGHTS.to_string());
        let risk_level = overall_risk(&insights);

        info!(
            insights = insights.len(),
            risk_level = %risk_level,
            "AI query complete"
        );

        Ok(AIQueryResponse {
            query_id: 0,
            query_type: request.query_type,
            tickers,
            insights,
            synthesis,
            risk_level,
            execution_time_ms: elapsed_ms(start),
            timestamp: Utc::now(),
        })
    }

    // =============================
    // Query types
    // =============================

    async fn run_market_analysis(&self, tickers: &[String]) -> Result<Vec<AgentInsight>> {
        let mut insights = Vec::new();

        for ticker in tickers {
            let Some(quote) = self.quote_for(ticker).await? else {
                continue;
            };
            let price_data = PriceData::from_quote(&quote);
            insights.push(self.market_insight(ticker, &quote, &price_data).await);
        }

        Ok(insights)
    }

    async fn run_news_sentiment(&self, tickers: &[String]) -> Result<Vec<AgentInsight>> {
        let mut insights = Vec::new();

        for ticker in tickers {
            insights.push(self.news_insight(ticker).await.0);
        }

        Ok(insights)
    }

    async fn run_risk_assessment(&self, tickers: &[String]) -> Result<Vec<AgentInsight>> {
        let mut insights = Vec::new();

        for ticker in tickers {
            let Some(quote) = self.quote_for(ticker).await? else {
                continue;
            };
            let price_data = PriceData::from_quote(&quote);

            let sentiment = self
                .news
                .analyze_news_sentiment(ticker, NEWS_DAYS_BACK)
                .await;
            let assessment = self.risk.assess_risk(ticker, &price_data, &sentiment).await;

            insights.push(AgentInsight::new(
                risk::PROFILE.name,
                assessment.confidence,
                assessment.assessment.clone(),
                json!({
                    "ticker": ticker,
                    "price_data": price_data,
                    "market_snapshot": quote.snapshot_json(),
                    "sentiment": sentiment.sentiment,
                    "risk_level": assessment.risk_level,
                }),
                assessment.reasoning.clone(),
            ));
        }

        Ok(insights)
    }

    async fn run_decision_synthesis(&self, tickers: &[String]) -> Result<Vec<AgentInsight>> {
        let mut insights = Vec::new();

        for ticker in tickers {
            let Some(quote) = self.quote_for(ticker).await? else {
                continue;
            };
            let price_data = PriceData::from_quote(&quote);

            let analysis = self.market.analyze_price_action(ticker, &price_data).await;
            let (news_insight, sentiment) = self.news_insight(ticker).await;
            let assessment = self.risk.assess_risk(ticker, &price_data, &sentiment).await;

            let mut ticker_insights = vec![
                AgentInsight::new(
                    market::PROFILE.name,
                    analysis.confidence,
                    analysis.analysis.clone(),
                    json!({
                        "ticker": ticker,
                        "price_data": price_data,
                        "risk_level": quote_risk(&quote, &price_data).0,
                    }),
                    analysis.reasoning.clone(),
                ),
                news_insight,
                AgentInsight::new(
                    risk::PROFILE.name,
                    assessment.confidence,
                    assessment.assessment.clone(),
                    json!({
                        "ticker": ticker,
                        "sentiment": sentiment.sentiment,
                        "risk_level": assessment.risk_level,
                    }),
                    assessment.reasoning.clone(),
                ),
            ];

            let synthesis = self
                .decision
                .synthesize(ticker, &analysis, &sentiment, &assessment)
                .await;
            let factors = self.decision.explain_decision_factors(ticker, &ticker_insights);

            ticker_insights.push(AgentInsight::new(
                decision::PROFILE.name,
                synthesis.overall_confidence,
                synthesis.synthesis,
                json!({
                    "ticker": ticker,
                    "risk_level": synthesis.overall_risk,
                    "decision_factors": factors,
                    "disclaimer": synthesis.disclaimer,
                }),
                synthesis.reasoning,
            ));

            insights.extend(ticker_insights);
        }

        Ok(insights)
    }

    // =============================
    // Per-agent insights
    // =============================

    async fn quote_for(&self, ticker: &str) -> Result<Option<StockPrice>> {
        let quote = self.manager.get_quote(ticker).await?;
        if quote.is_none() {
            debug!("No quote for {}, skipping", ticker);
        }
        Ok(quote)
    }

    async fn market_insight(&self, ticker: &str, quote: &StockPrice, price_data: &PriceData) -> AgentInsight {
        let analysis = self.market.analyze_price_action(ticker, price_data).await;
        let (risk_level, risk_note) = quote_risk(quote, price_data);

        let reasoning = format!(
            "{}\n\n**Risk Indicators:**\n- Price Volatility: {:.2}%\n- Intraday Trend: {}\n- Price Change: {:+.2}%\n- Risk Level: {}\n- {}",
            analysis.reasoning,
            price_data.volatility_pct,
            title_case(&price_data.intraday_trend),
            price_data.change_percent,
            risk_level.as_str().to_uppercase(),
            risk_note,
        );

        AgentInsight::new(
            market::PROFILE.name,
            analysis.confidence,
            analysis.analysis,
            json!({
                "ticker": ticker,
                "price_data": price_data,
                "risk_level": risk_level,
            }),
            reasoning,
        )
    }

    async fn news_insight(&self, ticker: &str) -> (AgentInsight, news::NewsSentiment) {
        let result = self
            .news
            .analyze_news_sentiment(ticker, NEWS_DAYS_BACK)
            .await;

        let mut summary = result.summary.clone();
        if result.article_count > 0 {
            summary.push_str(&format!(
                "\n\nAnalysis of {} recent articles shows {} sentiment. {}",
                result.article_count,
                result.sentiment.as_str().to_uppercase(),
                result.sentiment.interpretation()
            ));
        }

        let insight = AgentInsight::new(
            NEWS_AGENT_NAME,
            result.confidence,
            summary,
            json!({
                "ticker": ticker,
                "sentiment": result.sentiment,
                "article_count": result.article_count,
                "headline_sentiment": result.headline_sentiment,
            }),
            result.reasoning.clone(),
        );

        (insight, result)
    }
}

/// Risk read off the session numbers alone, with a one-line note
pub fn quote_risk(quote: &StockPrice, price_data: &PriceData) -> (RiskLabel, &'static str) {
    let change = quote.change_percent.unwrap_or(0.0).abs();
    let volatility = price_data.volatility_pct;

    if change > 5.0 || volatility > 5.0 {
        (
            RiskLabel::High,
            "High volatility detected. Consider careful position sizing.",
        )
    } else if change > 2.0 || volatility > 3.0 {
        (RiskLabel::Medium, "Moderate price movement. Monitor closely.")
    } else {
        (RiskLabel::Low, "Stable price action within normal range.")
    }
}

/// High wins outright; otherwise medium only when it outnumbers low
pub fn overall_risk(insights: &[AgentInsight]) -> RiskLabel {
    let mut low = 0;
    let mut medium = 0;

    for insight in insights {
        match insight.risk_level() {
            RiskLabel::High => return RiskLabel::High,
            RiskLabel::Medium => medium += 1,
            RiskLabel::Low => low += 1,
            RiskLabel::Unknown => {}
        }
    }

    if medium > low {
        RiskLabel::Medium
    } else {
        RiskLabel::Low
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn elapsed_ms(start: Instant) -> i64 {
    i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX)
}
