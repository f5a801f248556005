//! Financial AI Platform
//!
//! A thin orchestration layer over hosted LLM calls:
//! - Auth (signup, login, bearer tokens)
//! - Pluggable market data providers with a per-user subscription registry
//! - News search and keyword sentiment
//! - Four prompt-templated agents (market, news, risk, decision synthesis)
//! - Query history persisted in Postgres or in memory
//!
//! REQUEST FLOW:
//! ROUTE → VALIDATE → ORCHESTRATE (agents, sequential) → PERSIST → RESPOND

pub mod agents;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod gemini;
pub mod logging;
pub mod market;
pub mod models;
pub mod news;
pub mod orchestrator;
pub mod store;

#[cfg(test)]
mod testing;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use orchestrator::AgentOrchestrationService;
