//! One-shot analysis from the command line

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use financial_ai_platform::{
    config::Settings,
    gemini::GeminiClient,
    logging::init_tracing,
    market::{build_provider, StockStreamManager},
    models::{AIQueryRequest, QueryType, MAX_QUERY_TICKERS},
    news::NewsApiClient,
    orchestrator::AgentOrchestrationService,
};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "analyze", version)]
#[command(about = "Run one AI analysis and print the response as JSON", long_about = None)]
struct Args {
    /// Analysis to run
    #[arg(value_enum)]
    query_type: QueryType,

    /// Tickers to analyze
    #[arg(required = true, num_args = 1..=MAX_QUERY_TICKERS)]
    tickers: Vec<String>,

    /// Free-form context recorded with the query
    #[arg(short, long)]
    context: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    dotenv::dotenv().ok();

    let settings = Settings::from_env()?;
    init_tracing(&settings);

    let request = AIQueryRequest {
        tickers: args.tickers,
        query_type: args.query_type,
        additional_context: args.context,
    };
    if let Err(e) = request.validate() {
        Args::command().error(ErrorKind::ValueValidation, e).exit();
    }

    // Create components
    let manager = Arc::new(StockStreamManager::new(build_provider(&settings)?));
    let orchestrator = AgentOrchestrationService::new(
        Arc::new(GeminiClient::new(
            settings.gemini_api_key.clone(),
            settings.gemini_model.clone(),
        )?),
        Arc::new(NewsApiClient::new(settings.news_api_key.clone())?),
        manager.clone(),
    );

    info!(
        query_type = %request.query_type,
        tickers = ?request.tickers,
        "Running analysis"
    );

    let response = orchestrator.execute_query(&request).await;
    manager.shutdown().await;

    match response {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("Analysis failed: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
