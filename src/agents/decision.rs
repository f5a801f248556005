//! Synthesis of the market, news and risk views into decision support

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use super::{weighted_confidence, AgentProfile, MarketAnalysis, NewsSentiment, RiskAssessment};
use crate::gemini::LanguageModel;
use crate::models::{AgentInsight, RiskLabel};

pub const DISCLAIMER: &str =
    "This is decision-support analysis only. Not financial advice. Consult a qualified financial advisor.";

pub const PROFILE: AgentProfile = AgentProfile {
    name: "Decision Synthesis Coordinator",
    description: "Coordinates insights from all agents and provides synthesized decision support",
    instructions: &[
        "Synthesize insights from multiple analytical perspectives",
        "Identify consensus and conflicting signals",
        "Provide balanced, holistic recommendations",
        "Emphasize explainability and transparency",
        "Always include risk disclaimers",
        "Focus on decision-support, not trading execution",
        "Maintain objectivity and responsible AI principles",
    ],
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Synthesis {
    pub ticker: String,
    pub synthesis: String,
    pub overall_confidence: f64,
    pub overall_risk: RiskLabel,
    pub reasoning: String,
    pub disclaimer: Option<String>,
    pub error: Option<String>,
}

pub struct DecisionAgent {
    llm: Arc<dyn LanguageModel>,
}

impl DecisionAgent {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    pub async fn synthesize(
        &self,
        ticker: &str,
        market: &MarketAnalysis,
        news: &NewsSentiment,
        risk: &RiskAssessment,
    ) -> Synthesis {
        let prompt = format!(
            r#"
Synthesize the following analyses for {ticker} into a coherent decision support summary:

MARKET ANALYSIS:
{market_analysis}
Confidence: {market_confidence:.2}

NEWS & SENTIMENT:
{news_summary}
Sentiment: {sentiment}
Confidence: {news_confidence:.2}

RISK ASSESSMENT:
{risk_assessment}
Risk Level: {risk_level}
Confidence: {risk_confidence:.2}

Provide a synthesized decision support summary including:
1. Key consensus points across analyses
2. Conflicting signals or areas of uncertainty
3. Overall market outlook for this ticker
4. Recommended considerations for decision-making
5. Critical risk factors to monitor
6. Overall confidence in synthesis (0-1)

IMPORTANT: This is decision-support only. No trading recommendations. Emphasize responsible investing.

Keep response actionable and under 300 words.
"#,
            ticker = ticker,
            market_analysis = market.analysis,
            market_confidence = market.confidence,
            news_summary = news.summary,
            sentiment = news.sentiment,
            news_confidence = news.confidence,
            risk_assessment = risk.assessment,
            risk_level = risk.risk_level,
            risk_confidence = risk.confidence,
        );

        match self.llm.generate(&PROFILE.system_prompt(), &prompt).await {
            Ok(text) => Synthesis {
                ticker: ticker.to_string(),
                synthesis: text,
                overall_confidence: weighted_confidence(&[
                    market.confidence,
                    news.confidence,
                    risk.confidence,
                ]),
                overall_risk: risk.risk_level,
                reasoning: "Synthesized from market, sentiment, and risk analyses".to_string(),
                disclaimer: Some(DISCLAIMER.to_string()),
                error: None,
            },
            Err(e) => {
                error!("Decision synthesis error for {}: {}", ticker, e);
                Synthesis {
                    ticker: ticker.to_string(),
                    synthesis: "Unable to synthesize insights".to_string(),
                    overall_confidence: 0.0,
                    overall_risk: risk.risk_level,
                    reasoning: "Synthesis failed due to API error".to_string(),
                    disclaimer: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Human-readable breakdown of what each agent contributed
    pub fn explain_decision_factors(&self, ticker: &str, insights: &[AgentInsight]) -> String {
        let factors: Vec<String> = insights
            .iter()
            .map(|i| format!("- {} (Confidence: {:.2}): {}", i.agent_name, i.confidence, i.reasoning))
            .collect();

        format!(
            "Decision factors for {}:\n\n{}\n\nAll factors are considered with explainability and transparency in mind.",
            ticker,
            factors.join("\n")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sentiment;
    use crate::testing::ScriptedModel;

    fn inputs() -> (MarketAnalysis, NewsSentiment, RiskAssessment) {
        let market = MarketAnalysis {
            ticker: "AAPL".to_string(),
            analysis: "Uptrend".to_string(),
            confidence: 1.0,
            data_points_analyzed: 10,
            reasoning: String::new(),
            error: None,
        };
        let news = NewsSentiment {
            ticker: "AAPL".to_string(),
            sentiment: Sentiment::Bullish,
            confidence: 0.5,
            summary: "Upbeat coverage".to_string(),
            article_count: 4,
            reasoning: String::new(),
            headline_sentiment: None,
            error: None,
        };
        let risk = RiskAssessment {
            ticker: "AAPL".to_string(),
            risk_level: RiskLabel::High,
            confidence: 0.0,
            assessment: "Elevated".to_string(),
            reasoning: String::new(),
            error: Some("failed".to_string()),
        };
        (market, news, risk)
    }

    #[tokio::test]
    async fn test_synthesis_confidence_ignores_failed_agents() {
        let llm = Arc::new(ScriptedModel::always("Balanced view"));
        let agent = DecisionAgent::new(llm.clone());
        let (market, news, risk) = inputs();

        let result = agent.synthesize("AAPL", &market, &news, &risk).await;
        assert_eq!(result.synthesis, "Balanced view");
        assert_eq!(result.overall_confidence, 0.75);
        assert_eq!(result.overall_risk, RiskLabel::High);
        assert_eq!(result.disclaimer.as_deref(), Some(DISCLAIMER));

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].1.contains("Risk Level: high"));
        assert!(prompts[0].1.contains("Sentiment: bullish"));
    }

    #[tokio::test]
    async fn test_synthesis_failure() {
        let agent = DecisionAgent::new(Arc::new(ScriptedModel::failing("quota")));
        let (market, news, risk) = inputs();

        let result = agent.synthesize("AAPL", &market, &news, &risk).await;
        assert_eq!(result.synthesis, "Unable to synthesize insights");
        assert_eq!(result.overall_confidence, 0.0);
        assert!(result.error.is_some());
    }

    #[test]
    fn test_explain_decision_factors() {
        let agent = DecisionAgent::new(Arc::new(ScriptedModel::always("")));
        let insights = vec![
            AgentInsight::new("Market", 0.8, "s", serde_json::json!({}), "trend"),
            AgentInsight::new("News", 0.333, "s", serde_json::json!({}), "headlines"),
        ];

        let text = agent.explain_decision_factors("AAPL", &insights);
        assert!(text.starts_with("Decision factors for AAPL:\n\n"));
        assert!(text.contains("- Market (Confidence: 0.80): trend\n- News (Confidence: 0.33): headlines"));
        assert!(text.ends_with("transparency in mind."));
    }
}
