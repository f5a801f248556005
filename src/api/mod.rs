//! REST API server
//!
//! Route groups live in their own modules and are nested under `/api/*`.
//! Everything except `/`, `/health`, `/dashboard` and the quote stream
//! requires a bearer token.

pub mod auth_routes;
pub mod error;
pub mod insights_routes;
pub mod market_routes;
pub mod news_routes;

use axum::http::{header, HeaderValue, Method};
use axum::response::Html;
use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::JwtAuth;
use crate::config::Settings;
use crate::market::StockStreamManager;
use crate::news::NewsProvider;
use crate::orchestrator::AgentOrchestrationService;
use crate::store::Repository;
use crate::Result;

const SERVICE_NAME: &str = "Financial AI Agent Platform";
const DASHBOARD_HTML: &str = include_str!("../../assets/dashboard.html");

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn Repository>,
    pub jwt: Arc<JwtAuth>,
    pub manager: Arc<StockStreamManager>,
    pub news: Arc<dyn NewsProvider>,
    pub orchestrator: Arc<AgentOrchestrationService>,
    /// Whether an LLM key is configured; reported by `/health`
    pub llm_ready: bool,
}

/// =============================
/// Service Endpoints
/// =============================

async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.settings.environment,
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "database": state.store.backend(),
        "ai_agents": if state.llm_ready { "operational" } else { "not_configured" },
        "market_data": state.manager.provider_name(),
    }))
}

async fn dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.settings.allowed_origins);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/dashboard", get(dashboard))
        .nest("/api/auth", auth_routes::routes())
        .nest("/api/market", market_routes::routes())
        .nest("/api/insights", insights_routes::routes())
        .nest("/api/news", news_routes::routes())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(state: AppState, port: u16) -> Result<()> {
    let manager = state.manager.clone();
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Dashboard: http://127.0.0.1:{}/dashboard", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down {}...", SERVICE_NAME);
    manager.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Router fixtures shared by the route tests

    use super::*;
    use crate::market::MarketDataProvider;
    use crate::store::InMemoryStore;
    use crate::testing::{FixedQuoteProvider, ScriptedModel, StaticNews};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use tower::ServiceExt;

    pub struct Harness {
        pub state: AppState,
        pub store: Arc<InMemoryStore>,
    }

    impl Harness {
        pub fn new(llm: ScriptedModel, news: StaticNews, provider: FixedQuoteProvider) -> Self {
            let settings = Arc::new(Settings::from_lookup(|_| None).unwrap());
            let store = Arc::new(InMemoryStore::new());
            let provider: Arc<dyn MarketDataProvider> = Arc::new(provider);
            let manager = Arc::new(StockStreamManager::new(provider));
            let news: Arc<dyn NewsProvider> = Arc::new(news);
            let orchestrator = Arc::new(AgentOrchestrationService::new(
                Arc::new(llm),
                news.clone(),
                manager.clone(),
            ));

            let state = AppState {
                jwt: Arc::new(JwtAuth::from_settings(&settings).unwrap()),
                settings,
                store: store.clone(),
                manager,
                news,
                orchestrator,
                llm_ready: true,
            };

            Self { state, store }
        }

        pub fn offline() -> Self {
            Self::new(
                ScriptedModel::always("Neutral outlook. Confidence: 0.5"),
                StaticNews::default(),
                FixedQuoteProvider::new(Vec::new()),
            )
        }

        pub async fn send(&self, request: Request<Body>) -> Response {
            create_router(self.state.clone()).oneshot(request).await.unwrap()
        }

        /// Sign up and log in; returns the bearer token
        pub async fn login_as(&self, username: &str) -> String {
            let signup = json!({
                "email": format!("{}@example.com", username),
                "username": username,
                "password": "password123",
            });
            let response = self.send(json_request("POST", "/api/auth/signup", None, &signup)).await;
            assert_eq!(response.status(), StatusCode::CREATED);

            let login = json!({"username": username, "password": "password123"});
            let response = self.send(json_request("POST", "/api/auth/login", None, &login)).await;
            assert_eq!(response.status(), StatusCode::OK);
            body_json(response).await["access_token"]
                .as_str()
                .unwrap()
                .to_string()
        }
    }

    pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    pub fn empty_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    pub async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
