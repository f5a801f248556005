//! `/api/insights`: run AI analyses and browse the query history

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::auth::CurrentUser;
use crate::models::{AIQueryRequest, AIQueryResponse};
use crate::store::{NewQueryRecord, QueryRecord};

const DEFAULT_HISTORY_LIMIT: i64 = 20;
const MAX_HISTORY_LIMIT: i64 = 100;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/analyze", post(analyze))
        .route("/history", get(history))
        .route("/history/:id", get(history_detail))
}

async fn analyze(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<AIQueryRequest>, JsonRejection>,
) -> ApiResult<Json<AIQueryResponse>> {
    let Json(request) = payload?;
    request.validate()?;

    info!(
        "User {} requested {} analysis for {:?}",
        user.username, request.query_type, request.tickers
    );

    let analysis_failed = |e: crate::error::PlatformError| {
        error!("Analysis error for user {}: {}", user.username, e);
        ApiError::Internal(format!("Analysis failed: {}", e))
    };

    let mut response = state
        .orchestrator
        .execute_query(&request)
        .await
        .map_err(analysis_failed)?;

    let record = state
        .store
        .insert_query(NewQueryRecord {
            user_id: user.id,
            query_type: request.query_type.as_str().to_string(),
            query_params: json!({
                "tickers": response.tickers,
                "additional_context": request.additional_context,
            }),
            agent_response: json!({
                "query_id": response.query_id,
                "risk_level": response.risk_level,
                "insights_count": response.insights.len(),
            }),
            response_summary: response.synthesis.clone(),
            execution_time_ms: response.execution_time_ms,
        })
        .await
        .map_err(analysis_failed)?;

    response.query_id = record.id;

    info!(
        "Analysis completed for user {} in {}ms",
        user.username, response.execution_time_ms
    );

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
struct HistoryEntry {
    id: i64,
    query_type: String,
    query_params: Value,
    response_summary: String,
    execution_time_ms: i64,
    created_at: DateTime<Utc>,
}

impl From<QueryRecord> for HistoryEntry {
    fn from(record: QueryRecord) -> Self {
        Self {
            id: record.id,
            query_type: record.query_type,
            query_params: record.query_params,
            response_summary: record.response_summary,
            execution_time_ms: record.execution_time_ms,
            created_at: record.created_at,
        }
    }
}

async fn history(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> ApiResult<Json<Vec<HistoryEntry>>> {
    let Query(params) = params?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let records = state.store.list_queries(user.id, limit).await?;
    Ok(Json(records.into_iter().map(HistoryEntry::from).collect()))
}

async fn history_detail(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    query_id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<QueryRecord>> {
    let Path(query_id) = query_id?;

    state
        .store
        .get_query(user.id, query_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Query not found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use axum::http::StatusCode;
    use serde_json::json;
    use crate::store::response_digest;
    use crate::testing::{quote, FixedQuoteProvider, ScriptedModel, StaticNews};

    fn harness() -> Harness {
        Harness::new(
            ScriptedModel::always("Steady trend. Confidence: 0.8"),
            StaticNews::with_titles(&["Quarterly growth"]),
            FixedQuoteProvider::new(vec![quote("AAPL", 100.5, 100.0, 101.0, 99.5, 0.5)]),
        )
    }

    #[tokio::test]
    async fn test_analyze_persists_history() {
        let harness = harness();
        let token = harness.login_as("alice").await;

        let body = json!({"tickers": ["aapl"], "query_type": "market_analysis", "additional_context": "long term"});
        let response = harness
            .send(json_request("POST", "/api/insights/analyze", Some(&token), &body))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let analysis = body_json(response).await;
        assert_eq!(analysis["query_id"], 1);
        assert_eq!(analysis["risk_level"], "low");
        assert_eq!(analysis["tickers"], json!(["AAPL"]));
        assert_eq!(analysis["insights"][0]["agent_name"], "Comprehensive Market Analyst");

        let history = body_json(
            harness
                .send(empty_request("GET", "/api/insights/history", Some(&token)))
                .await,
        )
        .await;
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(history[0]["query_type"], "market_analysis");
        assert_eq!(history[0]["query_params"]["additional_context"], "long term");
        assert!(history[0].get("agent_response").is_none());

        let detail = body_json(
            harness
                .send(empty_request("GET", "/api/insights/history/1", Some(&token)))
                .await,
        )
        .await;
        assert_eq!(detail["agent_response"]["query_id"], 1);
        assert_eq!(detail["agent_response"]["insights_count"], 1);
        assert_eq!(
            detail["response_digest"],
            response_digest(&detail["agent_response"])
        );
    }

    #[tokio::test]
    async fn test_analyze_validation() {
        let harness = harness();
        let token = harness.login_as("alice").await;

        let too_many: Vec<String> = (0..11).map(|i| format!("T{}", i)).collect();
        let body = json!({"tickers": too_many, "query_type": "market_analysis"});
        let response = harness
            .send(json_request("POST", "/api/insights/analyze", Some(&token), &body))
            .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = json!({"tickers": ["AAPL"], "query_type": "astrology"});
        let response = harness
            .send(json_request("POST", "/api/insights/analyze", Some(&token), &body))
            .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_history_is_private_and_limited() {
        let harness = harness();
        let alice = harness.login_as("alice").await;
        let bob = harness.login_as("bobby").await;

        let body = json!({"tickers": ["AAPL"], "query_type": "news_sentiment"});
        for _ in 0..3 {
            harness
                .send(json_request("POST", "/api/insights/analyze", Some(&alice), &body))
                .await;
        }

        let history = body_json(
            harness
                .send(empty_request("GET", "/api/insights/history?limit=2", Some(&alice)))
                .await,
        )
        .await;
        let ids: Vec<i64> = history
            .as_array()
            .unwrap()
            .iter()
            .map(|h| h["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![3, 2]);

        let history = body_json(
            harness
                .send(empty_request("GET", "/api/insights/history?limit=0", Some(&alice)))
                .await,
        )
        .await;
        assert_eq!(history.as_array().unwrap().len(), 1);

        let response = harness
            .send(empty_request("GET", "/api/insights/history/1", Some(&bob)))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["detail"], "Query not found");

        let response = harness
            .send(empty_request("GET", "/api/insights/history/abc", Some(&alice)))
            .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body_json(response).await["detail"].is_string());
    }
}
