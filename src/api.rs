//! REST API Server for the financial query agent
//!
//! Exposes the orchestrator and the read-only data paths via HTTP endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::agent::Orchestrator;
use crate::error::OrchestrationError;
use crate::forecast::{ForecastEngine, ForecastError};
use crate::models::QueryResponse;
use crate::store::Database;

pub const DEFAULT_RAW_LIMIT: i64 = 10;
pub const DEFAULT_FORECAST_HORIZON: usize = 6;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct RawParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ForecastParams {
    pub horizon: Option<usize>,
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub db: Database,
    pub engine: ForecastEngine,
}

fn error_body(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message.into() })))
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// =============================
/// Question Endpoint
/// =============================

async fn query_handler(
    State(state): State<ApiState>,
    Query(params): Query<QueryParams>,
) -> Json<QueryResponse> {
    info!("Received question: {}", params.q);
    Json(state.orchestrator.answer(&params.q).await)
}

/// =============================
/// Data Endpoints
/// =============================

async fn raw_data(
    State(state): State<ApiState>,
    Query(params): Query<RawParams>,
) -> (StatusCode, Json<Value>) {
    let limit = params.limit.unwrap_or(DEFAULT_RAW_LIMIT);

    match state.db.raw_transactions(limit).await {
        Ok(rows) => (StatusCode::OK, Json(json!({ "transactions": rows }))),
        Err(e) => {
            warn!("Raw data read failed: {}", e);
            error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn revenue_forecast(
    State(state): State<ApiState>,
    Query(params): Query<ForecastParams>,
) -> (StatusCode, Json<Value>) {
    let horizon = params.horizon.unwrap_or(DEFAULT_FORECAST_HORIZON);

    let rows = match state.db.monthly_revenue_rows().await {
        Ok(rows) => rows,
        Err(e) => {
            warn!("Revenue series read failed: {}", e);
            return error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    let engine = state.engine;
    let fitted = tokio::task::spawn_blocking(move || engine.forecast(&rows, "amount", horizon))
        .await
        .map_err(|e| OrchestrationError::Forecast(ForecastError::FitFailed(e.to_string())))
        .and_then(|result| result.map_err(OrchestrationError::from));

    match fitted {
        Ok(result) => (StatusCode::OK, Json(result.to_value())),
        Err(e) => error_body(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/query", get(query_handler))
        .route("/data/raw", get(raw_data))
        .route("/forecast", get(revenue_forecast))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
