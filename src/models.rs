//! Core data models for the financial query agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A result row: ordered column name → value mapping
pub type Row = serde_json::Map<String, serde_json::Value>;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Revenue,
    Expense,
    Profit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Revenue => "revenue",
            TransactionType::Expense => "expense",
            TransactionType::Profit => "profit",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//
// ================= Ledger =================
//

/// A categorized ledger entry, read-only to the agent
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: i64,
    pub date: String,
    pub source: String,
    /// Kept as text: rows outside the closed set are a data-quality issue,
    /// not something the reader should fail on.
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    pub category: String,
    pub amount: f64,
}

/// Insert payload for the transaction store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub date: String,
    pub source: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub category: String,
    pub amount: f64,
}

impl NewTransaction {
    pub fn new(date: &str, kind: TransactionType, category: &str, amount: f64) -> Self {
        Self {
            date: date.to_string(),
            source: "manual".to_string(),
            kind,
            category: category.to_string(),
            amount,
        }
    }
}

//
// ================= Audit =================
//

/// A persisted audit record of one question/response turn
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueryLogEntry {
    pub id: i64,
    pub question: String,
    pub sql: Option<String>,
    pub tool: String,
    pub result: Option<String>,
    pub report: String,
    pub created_at: DateTime<Utc>,
}

/// Audit record before the store assigns `id` and `created_at`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryLogRecord {
    pub question: String,
    pub sql: Option<String>,
    pub tool: String,
    pub result: Option<String>,
    pub report: String,
}

//
// ================= Tool I/O =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub data: serde_json::Value,
    pub error: Option<String>,
}

impl ToolOutput {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }

    /// Payload handed back to the reasoning model and stored in the audit log
    pub fn to_model_payload(&self) -> serde_json::Value {
        match &self.error {
            Some(message) => serde_json::json!({ "error": message }),
            None => self.data.clone(),
        }
    }
}

//
// ================= Final Result =================
//

/// Caller-facing result of one question
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum QueryResponse {
    Answered { question: String, report: String },
    Failed { error: String },
}

impl QueryResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, QueryResponse::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_response_shapes() {
        let ok = QueryResponse::Answered {
            question: "q".to_string(),
            report: "## Report".to_string(),
        };
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json, serde_json::json!({ "question": "q", "report": "## Report" }));

        let failed = QueryResponse::Failed {
            error: "boom".to_string(),
        };
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "boom" }));
        assert!(failed.is_error());
    }

    #[test]
    fn test_tool_output_payload() {
        let failed = ToolOutput::failed("Target column 'x' not found in data");
        assert_eq!(
            failed.to_model_payload(),
            serde_json::json!({ "error": "Target column 'x' not found in data" })
        );

        let ok = ToolOutput::ok(serde_json::json!([{ "total": 3 }]));
        assert_eq!(ok.to_model_payload(), serde_json::json!([{ "total": 3 }]));
    }
}
