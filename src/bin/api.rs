use financial_query_agent::{
    agent::Orchestrator,
    api::{start_server, ApiState},
    config::AppConfig,
    forecast::ForecastEngine,
    store::Database,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    if config.gemini_api_key.trim().is_empty() {
        warn!("GEMINI_API_KEY not set in .env; /query will report the missing credential");
    }

    info!("Financial Query Agent - API Server");
    info!("Port: {}", config.port);
    info!("Model: {}", config.gemini_model);

    let db = Database::connect(&config.database_url).await?;
    db.init_schema().await?;

    let orchestrator = Arc::new(Orchestrator::from_config(&config, db.clone())?);
    info!("Orchestrator initialized");

    let state = ApiState {
        orchestrator,
        db,
        engine: ForecastEngine::new(config.arima_order),
    };

    start_server(state, config.port).await?;

    Ok(())
}
