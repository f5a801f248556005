//! Risk and ESG assessment

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use super::{extract_confidence, extract_risk_level, AgentProfile, NewsSentiment, PriceData};
use crate::gemini::LanguageModel;
use crate::models::RiskLabel;

const DEFAULT_CONFIDENCE: f64 = 0.7;
const ESG_DISCLAIMER: &str = "High-level assessment. Consult ESG rating agencies for detailed scores.";

pub const PROFILE: AgentProfile = AgentProfile {
    name: "Risk & ESG Analyst",
    description: "Specialized in risk assessment, volatility analysis, and ESG considerations",
    instructions: &[
        "Evaluate market and company-specific risks",
        "Assess volatility and downside potential",
        "Consider ESG factors and sustainability",
        "Identify regulatory and compliance risks",
        "Provide risk-adjusted perspectives",
        "Emphasize responsible investing principles",
    ],
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub ticker: String,
    pub risk_level: RiskLabel,
    pub confidence: f64,
    pub assessment: String,
    pub reasoning: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsgEvaluation {
    pub ticker: String,
    pub perspective: Option<String>,
    pub disclaimer: String,
    pub error: Option<String>,
}

pub struct RiskAgent {
    llm: Arc<dyn LanguageModel>,
}

impl RiskAgent {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    pub async fn assess_risk(
        &self,
        ticker: &str,
        price_data: &PriceData,
        sentiment: &NewsSentiment,
    ) -> RiskAssessment {
        let prompt = format!(
            r#"
Perform a risk assessment for {ticker} based on the following:

Market Data:
- Current Price: ${price:.2}
- Volatility: {volatility:.2}%
- Volume: {volume}
- Price Change: {change_percent:.2}%

Sentiment Analysis:
- Overall Sentiment: {sentiment}
- Confidence: {sentiment_confidence:.2}

Provide a comprehensive risk assessment including:
1. Overall risk level (low/medium/high)
2. Key risk factors
3. Volatility assessment
4. Downside potential
5. Risk mitigation suggestions
6. Confidence in assessment (0-1)

Focus on actionable, responsible investment guidance (under 250 words).
"#,
            ticker = ticker,
            price = price_data.current_price,
            volatility = price_data.volatility_pct,
            volume = price_data.volume,
            change_percent = price_data.change_percent,
            sentiment = sentiment.sentiment,
            sentiment_confidence = sentiment.confidence,
        );

        match self.llm.generate(&PROFILE.system_prompt(), &prompt).await {
            Ok(text) => RiskAssessment {
                ticker: ticker.to_string(),
                risk_level: extract_risk_level(&text),
                confidence: extract_confidence(&text, DEFAULT_CONFIDENCE),
                assessment: text,
                reasoning: "Risk analysis based on volatility, market conditions, and sentiment"
                    .to_string(),
                error: None,
            },
            Err(e) => {
                error!("Risk agent analysis error for {}: {}", ticker, e);
                RiskAssessment {
                    ticker: ticker.to_string(),
                    risk_level: RiskLabel::Unknown,
                    confidence: 0.0,
                    assessment: "Unable to assess risk".to_string(),
                    reasoning: "Risk analysis failed due to API error".to_string(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub async fn evaluate_esg(&self, ticker: &str) -> EsgEvaluation {
        let prompt = format!(
            r#"
Provide a general ESG (Environmental, Social, Governance) perspective for {ticker}.

Consider:
1. Environmental impact and sustainability
2. Social responsibility and community impact
3. Governance structure and corporate ethics
4. Overall ESG risk level

Note: This is a high-level assessment. For detailed ESG scores, consult specialized ESG rating agencies.

Keep response under 200 words.
"#,
            ticker = ticker
        );

        match self.llm.generate(&PROFILE.system_prompt(), &prompt).await {
            Ok(text) => EsgEvaluation {
                ticker: ticker.to_string(),
                perspective: Some(text),
                disclaimer: ESG_DISCLAIMER.to_string(),
                error: None,
            },
            Err(e) => {
                error!("ESG evaluation error for {}: {}", ticker, e);
                EsgEvaluation {
                    ticker: ticker.to_string(),
                    perspective: None,
                    disclaimer: ESG_DISCLAIMER.to_string(),
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sentiment;
    use crate::testing::{quote, ScriptedModel};

    fn sentiment() -> NewsSentiment {
        NewsSentiment {
            ticker: "AAPL".to_string(),
            sentiment: Sentiment::Bullish,
            confidence: 0.8,
            summary: "Positive".to_string(),
            article_count: 3,
            reasoning: String::new(),
            headline_sentiment: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_risk_level_and_prompt() {
        let llm = Arc::new(ScriptedModel::always("Risk level: low. Confidence: 0.75"));
        let agent = RiskAgent::new(llm.clone());
        let data = PriceData::from_quote(&quote("AAPL", 101.0, 100.0, 102.0, 99.0, 1.0));

        let result = agent.assess_risk("AAPL", &data, &sentiment()).await;
        assert_eq!(result.risk_level, RiskLabel::Low);
        assert_eq!(result.confidence, 0.75);

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].1.contains("- Volatility: 3.00%"));
        assert!(prompts[0].1.contains("- Overall Sentiment: bullish"));
    }

    #[tokio::test]
    async fn test_failure_yields_unknown_risk() {
        let agent = RiskAgent::new(Arc::new(ScriptedModel::failing("down")));
        let data = PriceData::from_quote(&quote("AAPL", 101.0, 100.0, 102.0, 99.0, 1.0));

        let result = agent.assess_risk("AAPL", &data, &sentiment()).await;
        assert_eq!(result.risk_level, RiskLabel::Unknown);
        assert_eq!(result.confidence, 0.0);

        let esg = agent.evaluate_esg("AAPL").await;
        assert!(esg.perspective.is_none());
        assert!(esg.error.is_some());
    }

    #[tokio::test]
    async fn test_esg_perspective() {
        let agent = RiskAgent::new(Arc::new(ScriptedModel::always("Strong governance")));
        let esg = agent.evaluate_esg("MSFT").await;
        assert_eq!(esg.perspective.as_deref(), Some("Strong governance"));
        assert_eq!(esg.disclaimer, ESG_DISCLAIMER);
    }
}
