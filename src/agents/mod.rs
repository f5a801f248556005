//! Prompt-templated analysis agents
//!
//! Each agent formats its inputs into a prompt, calls the language model
//! once, and pulls labels out of the free-text reply. An LLM failure never
//! propagates: the agent returns a zero-confidence placeholder instead.

pub mod decision;
pub mod market;
pub mod news;
pub mod risk;

use regex::Regex;

use crate::models::{clamp_confidence, RiskLabel, Sentiment};

pub use decision::{DecisionAgent, Synthesis};
pub use market::{MarketAnalysis, MarketDataAgent, PriceData};
pub use news::{NewsSentiment, NewsSentimentAgent};
pub use risk::{EsgEvaluation, RiskAgent, RiskAssessment};

lazy_static::lazy_static! {
    static ref CONFIDENCE_RE: Regex =
        Regex::new(r"confidence[:\s]+([0-9.]+)").expect("confidence pattern is valid");
}

/// Fixed persona sent as the system instruction
pub struct AgentProfile {
    pub name: &'static str,
    pub description: &'static str,
    pub instructions: &'static [&'static str],
}

impl AgentProfile {
    pub fn system_prompt(&self) -> String {
        let mut prompt = format!("You are {}. {}.\n\nInstructions:\n", self.name, self.description);
        for instruction in self.instructions {
            prompt.push_str("- ");
            prompt.push_str(instruction);
            prompt.push('\n');
        }
        prompt.push_str("\nFormat your response in markdown.");
        prompt
    }
}

/// First `confidence: <number>` in the text, as a value in [0, 1]
pub fn extract_confidence(text: &str, default: f64) -> f64 {
    let lower = text.to_lowercase();

    let Some(raw) = CONFIDENCE_RE
        .captures(&lower)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches('.'))
    else {
        return default;
    };

    match raw.parse::<f64>() {
        Ok(value) if value > 1.0 && value <= 100.0 => clamp_confidence(value / 100.0),
        Ok(value) => clamp_confidence(value),
        Err(_) => default,
    }
}

pub fn extract_sentiment(text: &str) -> Sentiment {
    let lower = text.to_lowercase();

    if lower.contains("bullish") || lower.contains("positive") {
        Sentiment::Bullish
    } else if lower.contains("bearish") || lower.contains("negative") {
        Sentiment::Bearish
    } else {
        Sentiment::Neutral
    }
}

pub fn extract_risk_level(text: &str) -> RiskLabel {
    let lower = text.to_lowercase();
    let says = |level: &str| {
        lower.contains(&format!("{} risk", level)) || lower.contains(&format!("risk level: {}", level))
    };

    if says("high") {
        RiskLabel::High
    } else if says("low") {
        RiskLabel::Low
    } else {
        RiskLabel::Medium
    }
}

/// Mean of the positive confidences, 0.5 when there are none
pub fn weighted_confidence(confidences: &[f64]) -> f64 {
    let valid: Vec<f64> = confidences.iter().copied().filter(|c| *c > 0.0).collect();

    if valid.is_empty() {
        return 0.5;
    }

    valid.iter().sum::<f64>() / valid.len() as f64
}

/// Error text cut down for user-facing placeholders
pub(crate) fn short_error(error: &impl std::fmt::Display) -> String {
    error.to_string().chars().take(100).collect()
}
