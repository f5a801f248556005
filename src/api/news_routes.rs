//! `/api/news`: headlines, search and topic feeds
//!
//! Upstream failures are logged and answered with an empty list.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{error, info};

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::auth::CurrentUser;
use crate::news::{topic_query, Article};

const MAX_ARTICLES: u32 = 100;
const MAX_DAYS_BACK: u32 = 30;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/financial", get(financial_news))
        .route("/search", get(search_news))
        .route("/topics/:topic", get(topic_news))
}

#[derive(Debug, Deserialize)]
struct FinancialParams {
    #[serde(default = "default_category")]
    category: String,
    #[serde(default = "default_financial_max")]
    max_articles: u32,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: String,
    #[serde(default = "default_days_back")]
    days_back: u32,
    #[serde(default = "default_search_max")]
    max_articles: u32,
}

#[derive(Debug, Deserialize)]
struct WindowParams {
    #[serde(default = "default_days_back")]
    days_back: u32,
    #[serde(default = "default_search_max")]
    max_articles: u32,
}

fn default_category() -> String {
    "business".to_string()
}

fn default_financial_max() -> u32 {
    30
}

fn default_days_back() -> u32 {
    7
}

fn default_search_max() -> u32 {
    20
}

fn check_max_articles(max_articles: u32) -> ApiResult<()> {
    if max_articles > MAX_ARTICLES {
        return Err(ApiError::Validation(format!(
            "max_articles must be less than or equal to {}",
            MAX_ARTICLES
        )));
    }
    Ok(())
}

impl WindowParams {
    fn validate(&self) -> ApiResult<()> {
        if self.days_back > MAX_DAYS_BACK {
            return Err(ApiError::Validation(format!(
                "days_back must be less than or equal to {}",
                MAX_DAYS_BACK
            )));
        }
        check_max_articles(self.max_articles)
    }
}

async fn financial_news(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    params: Result<Query<FinancialParams>, QueryRejection>,
) -> ApiResult<Json<Vec<Article>>> {
    let Query(params) = params?;
    check_max_articles(params.max_articles)?;

    let articles = match state
        .news
        .market_news(&params.category, params.max_articles)
        .await
    {
        Ok(articles) => articles,
        Err(e) => {
            error!("Error fetching financial news: {}", e);
            Vec::new()
        }
    };

    info!(
        "User {} fetched {} financial news articles",
        user.username,
        articles.len()
    );
    Ok(Json(articles))
}

async fn search_news(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> ApiResult<Json<Vec<Article>>> {
    let Query(params) = params?;
    let window = WindowParams {
        days_back: params.days_back,
        max_articles: params.max_articles,
    };
    window.validate()?;

    let articles = fetch_stock_news(&state, &params.query, &window).await;

    info!(
        "User {} searched news for '{}': {} results",
        user.username,
        params.query,
        articles.len()
    );
    Ok(Json(articles))
}

async fn topic_news(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(topic): Path<String>,
    params: Result<Query<WindowParams>, QueryRejection>,
) -> ApiResult<Json<Vec<Article>>> {
    let Query(window) = params?;
    window.validate()?;

    let articles = fetch_stock_news(&state, &topic_query(&topic), &window).await;

    info!(
        "User {} fetched {} articles for topic '{}'",
        user.username,
        articles.len(),
        topic
    );
    Ok(Json(articles))
}

async fn fetch_stock_news(state: &AppState, query: &str, window: &WindowParams) -> Vec<Article> {
    match state
        .news
        .stock_news(query, window.days_back, window.max_articles)
        .await
    {
        Ok(articles) => articles,
        Err(e) => {
            error!("Error searching news for {}: {}", query, e);
            Vec::new()
        }
    }
}
