//! Query audit log
//!
//! Every answered (or failed) question leaves one record. Sinks are injected
//! so the orchestrator never touches process-wide state.

use crate::error::OrchestrationError;
use crate::models::{QueryLogEntry, QueryLogRecord};
use crate::store::Database;
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Tool name recorded when no tool ran or the turn failed
pub const AGENT_TOOL: &str = "agent";

/// Durable destination for audit records
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: &QueryLogRecord) -> Result<()>;
}

/// Writes records into the `query_logs` table
#[derive(Clone, Debug)]
pub struct SqliteAuditSink {
    db: Database,
}

impl SqliteAuditSink {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// All records, oldest first
    pub async fn entries(&self) -> Result<Vec<QueryLogEntry>> {
        let entries = sqlx::query_as::<_, QueryLogEntry>(
            "SELECT id, question, sql, tool, result, report, created_at FROM query_logs ORDER BY id",
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(entries)
    }
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn append(&self, record: &QueryLogRecord) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO query_logs (question, sql, tool, result, report, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.question)
        .bind(&record.sql)
        .bind(&record.tool)
        .bind(&record.result)
        .bind(&record.report)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) => {
                tx.rollback().await?;
                Err(OrchestrationError::AuditError(e.to_string()))
            }
        }
    }
}

/// Keeps records in memory (development & testing)
#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    records: Arc<RwLock<Vec<QueryLogRecord>>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<QueryLogRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, record: &QueryLogRecord) -> Result<()> {
        self.records.write().await.push(record.clone());
        Ok(())
    }
}

/// Front door for audit writes; failures never reach the caller
#[derive(Clone)]
pub struct QueryAuditLog {
    sink: Arc<dyn AuditSink>,
}

impl QueryAuditLog {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Record one turn. `result` is stored as JSON text.
    pub async fn record(
        &self,
        question: &str,
        sql: Option<&str>,
        tool: &str,
        result: Option<&Value>,
        report: &str,
    ) {
        let result = match result.map(serde_json::to_string).transpose() {
            Ok(text) => text,
            Err(e) => {
                warn!("Audit log: result not serializable: {}", e);
                None
            }
        };

        let record = QueryLogRecord {
            question: question.to_string(),
            sql: sql.map(str::to_string),
            tool: tool.to_string(),
            result,
            report: report.to_string(),
        };

        match self.sink.append(&record).await {
            Ok(()) => debug!(tool = %record.tool, "Audit record written"),
            Err(e) => warn!("Audit log write failed: {}", e),
        }
    }
}
