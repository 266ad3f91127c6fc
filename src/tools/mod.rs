//! Agent tools and dispatch
//!
//! The reasoning model may request exactly two tools. Requests are validated
//! into the closed `ToolRequest` set before anything runs.

use crate::error::OrchestrationError;
use crate::forecast::MAX_FORECAST_HORIZON;
use crate::models::ToolOutput;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub mod forecast;
pub mod sql_guard;

pub use forecast::ForecastTool;
pub use sql_guard::{validate_select, SqlGuardTool};

pub const SQL_TOOL: &str = "sql_query";
pub const FORECAST_TOOL: &str = "forecast_arima";

/// A tool invocation as authored by the reasoning model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SqlQueryArgs {
    pub sql: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ForecastArgs {
    pub sql: String,
    #[serde(deserialize_with = "whole_number")]
    pub horizon: usize,
    pub target: String,
}

/// Models sometimes send integers as `3.0`
fn whole_number<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    let value = Value::deserialize(deserializer)?;
    if let Some(n) = value.as_u64() {
        return usize::try_from(n).map_err(D::Error::custom);
    }
    match value.as_f64() {
        Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 => Ok(f as usize),
        _ => Err(D::Error::custom(format!(
            "expected a non-negative whole number, got {}",
            value
        ))),
    }
}

/// Validated tool invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRequest {
    Sql(SqlQueryArgs),
    Forecast(ForecastArgs),
}

impl ToolRequest {
    /// Validate a model-authored call against the tool's argument schema
    pub fn from_call(call: &ToolCall) -> Result<Self> {
        match call.name.as_str() {
            SQL_TOOL => {
                let args: SqlQueryArgs = parse_args(call)?;
                if args.sql.trim().is_empty() {
                    return Err(OrchestrationError::InvalidToolInput(
                        "sql_query: 'sql' must not be empty".to_string(),
                    ));
                }
                Ok(ToolRequest::Sql(args))
            }
            FORECAST_TOOL => {
                let args: ForecastArgs = parse_args(call)?;
                if args.horizon < 1 || args.horizon > MAX_FORECAST_HORIZON {
                    return Err(OrchestrationError::InvalidToolInput(format!(
                        "forecast_arima: 'horizon' must be between 1 and {}",
                        MAX_FORECAST_HORIZON
                    )));
                }
                if args.target.trim().is_empty() {
                    return Err(OrchestrationError::InvalidToolInput(
                        "forecast_arima: 'target' must not be empty".to_string(),
                    ));
                }
                Ok(ToolRequest::Forecast(args))
            }
            other => Err(OrchestrationError::ToolNotFound(other.to_string())),
        }
    }

    pub fn tool_name(&self) -> &'static str {
        match self {
            ToolRequest::Sql(_) => SQL_TOOL,
            ToolRequest::Forecast(_) => FORECAST_TOOL,
        }
    }

    pub fn sql(&self) -> &str {
        match self {
            ToolRequest::Sql(args) => &args.sql,
            ToolRequest::Forecast(args) => &args.sql,
        }
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(call: &ToolCall) -> Result<T> {
    if !call.args.is_object() {
        return Err(OrchestrationError::InvalidToolInput(format!(
            "{}: arguments must be a JSON object",
            call.name
        )));
    }

    serde_json::from_value(call.args.clone()).map_err(|e| {
        OrchestrationError::InvalidToolInput(format!("{}: {}", call.name, e))
    })
}

/// Declared tool signature offered to the reasoning model
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON-schema style parameter description
    pub parameters: Value,
}

/// The two tools the agent may call
pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: SQL_TOOL,
            description: "Execute a read-only SQL query on the `transactions` table and return results as a list of rows.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "sql": { "type": "string", "description": "A single SELECT statement." }
                },
                "required": ["sql"]
            }),
        },
        ToolSpec {
            name: FORECAST_TOOL,
            description: "Fetch data with SQL and run an ARIMA forecast over monthly buckets.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "sql": {
                        "type": "string",
                        "description": "SELECT returning a date column first and a numeric target column."
                    },
                    "horizon": { "type": "integer", "description": "Number of future months to predict (1 to 120)." },
                    "target": { "type": "string", "description": "The column name to forecast, e.g. 'amount'." }
                },
                "required": ["sql", "horizon", "target"]
            }),
        },
    ]
}

/// Executes validated tool requests
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, request: &ToolRequest) -> Result<ToolOutput>;
}

/// Production executor backed by the transaction store
#[derive(Clone, Debug)]
pub struct Toolbox {
    sql: SqlGuardTool,
    forecast: ForecastTool,
}

impl Toolbox {
    pub fn new(sql: SqlGuardTool, forecast: ForecastTool) -> Self {
        Self { sql, forecast }
    }
}

#[async_trait]
impl ToolExecutor for Toolbox {
    async fn execute(&self, request: &ToolRequest) -> Result<ToolOutput> {
        match request {
            ToolRequest::Sql(args) => {
                let rows = self.sql.query(&args.sql).await?;
                Ok(ToolOutput::ok(Value::Array(
                    rows.into_iter().map(Value::Object).collect(),
                )))
            }
            ToolRequest::Forecast(args) => {
                let result = self
                    .forecast
                    .run(&args.sql, args.horizon, &args.target)
                    .await?;
                Ok(ToolOutput::ok(result.to_value()))
            }
        }
    }
}
