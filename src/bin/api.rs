use financial_ai_platform::{
    api::{start_server, AppState},
    auth::JwtAuth,
    config::Settings,
    gemini::{GeminiClient, LanguageModel},
    logging::init_tracing,
    market::{build_provider, StockStreamManager},
    news::{NewsApiClient, NewsProvider},
    orchestrator::AgentOrchestrationService,
    store::build_store,
};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    let settings = Arc::new(Settings::from_env()?);
    init_tracing(&settings);

    info!("🚀 Financial AI Agent Platform - API Server");
    info!("📍 Port: {} ({})", settings.port, settings.environment);

    // Create components
    let store = build_store(&settings);
    let provider = build_provider(&settings)?;
    let manager = Arc::new(StockStreamManager::new(provider));

    let gemini = GeminiClient::new(settings.gemini_api_key.clone(), settings.gemini_model.clone())?;
    let llm_ready = gemini.is_configured();
    if !llm_ready {
        warn!("⚠️  GEMINI_API_KEY not set; agents will return placeholder analyses");
    }
    let llm: Arc<dyn LanguageModel> = Arc::new(gemini);

    if settings.news_api_key.is_empty() {
        warn!("⚠️  NEWS_API_KEY not set; news endpoints will return empty lists");
    }
    let news: Arc<dyn NewsProvider> = Arc::new(NewsApiClient::new(settings.news_api_key.clone())?);

    let orchestrator = Arc::new(AgentOrchestrationService::new(
        llm,
        news.clone(),
        manager.clone(),
    ));

    let state = AppState {
        jwt: Arc::new(JwtAuth::from_settings(&settings)?),
        settings: settings.clone(),
        store,
        manager,
        news,
        orchestrator,
        llm_ready,
    };

    info!("✅ Agents initialized");
    info!("📡 Starting API server...");

    start_server(state, settings.port).await?;

    Ok(())
}
