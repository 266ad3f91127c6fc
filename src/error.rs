//! Error types for the financial query agent

use crate::forecast::ForecastError;
use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("{0}")]
    MissingCredential(String),

    #[error("Schema introspection failed: {0}")]
    SchemaError(String),

    #[error("SQL statement rejected: {0}")]
    SqlRejected(String),

    #[error("SQL execution failed: {0}")]
    SqlExecution(String),

    #[error("{0}")]
    Forecast(#[from] ForecastError),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("Synthesis error: {0}")]
    SynthesisError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Audit error: {0}")]
    AuditError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    /// Tool failures the model can react to, as opposed to plumbing failures
    /// that end the turn.
    pub fn is_recoverable_tool_failure(&self) -> bool {
        matches!(
            self,
            OrchestrationError::SqlRejected(_)
                | OrchestrationError::SqlExecution(_)
                | OrchestrationError::Forecast(_)
                | OrchestrationError::ToolNotFound(_)
                | OrchestrationError::InvalidToolInput(_)
        )
    }
}

impl From<sqlx::Error> for OrchestrationError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            // Errors raised by the engine for a statement it could not run
            sqlx::Error::Database(db) => OrchestrationError::SqlExecution(db.message().to_string()),
            sqlx::Error::ColumnDecode { index, source } => OrchestrationError::SqlExecution(
                format!("Failed to decode column {}: {}", index, source),
            ),
            other => OrchestrationError::DatabaseError(other.to_string()),
        }
    }
}
