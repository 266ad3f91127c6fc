use financial_query_agent::{
    agent::Orchestrator, config::AppConfig, models::QueryResponse, store::Database,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const SAMPLE_QUERIES: &[&str] = &[
    "What was the total profit in Q1?",
    "Show me revenue trends for 2024",
    "Which expense category had the highest increase this year?",
    "Compare Q1 and Q2 performance",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    let db = Database::connect(&config.database_url).await?;
    db.init_schema().await?;

    let orchestrator = Orchestrator::from_config(&config, db)?;

    info!("Running {} sample queries", SAMPLE_QUERIES.len());

    for question in SAMPLE_QUERIES {
        info!(">>> Running: {}", question);

        println!("\n>>> {}", question);
        match orchestrator.answer(question).await {
            QueryResponse::Answered { report, .. } => println!("{}", report),
            QueryResponse::Failed { error } => println!("ERROR: {}", error),
        }
        println!("{}", "-".repeat(80));
    }

    info!("Sample queries complete");
    Ok(())
}
