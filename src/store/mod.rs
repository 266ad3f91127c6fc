//! Transaction store
//!
//! SQLite-backed ledger plus the `query_logs` audit table. Owns pool setup,
//! schema creation, schema introspection and row decoding.

use crate::error::OrchestrationError;
use crate::models::{NewTransaction, Row, Transaction};
use crate::Result;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use std::str::FromStr;
use tracing::info;

pub const TRANSACTIONS_TABLE: &str = "transactions";

const MAX_CONNECTIONS: u32 = 5;

/// Handle to the transaction store
#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `url`
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| OrchestrationError::ConfigError(format!("Invalid DATABASE_URL: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        info!("Transaction store connected: {}", url);
        Ok(Self { pool })
    }

    /// Private in-memory database; a single connection so every caller sees it
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| OrchestrationError::ConfigError(e.to_string()))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the ledger and audit tables if missing
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              date VARCHAR NOT NULL,
              source VARCHAR NOT NULL,
              type VARCHAR NOT NULL,
              category VARCHAR NOT NULL,
              amount FLOAT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            OrchestrationError::DatabaseError(format!("Failed to create transactions table: {}", e))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS query_logs (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              question TEXT NOT NULL,
              sql TEXT,
              tool VARCHAR NOT NULL,
              result TEXT,
              report TEXT NOT NULL,
              created_at TIMESTAMP NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            OrchestrationError::DatabaseError(format!("Failed to create query_logs table: {}", e))
        })?;

        Ok(())
    }

    /// Render the live ledger schema as `transactions(col type, ...)`
    pub async fn describe_schema(&self) -> Result<String> {
        let columns = sqlx::query(&format!("PRAGMA table_info({})", TRANSACTIONS_TABLE))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| OrchestrationError::SchemaError(e.to_string()))?;

        if columns.is_empty() {
            return Err(OrchestrationError::SchemaError(format!(
                "table '{}' does not exist",
                TRANSACTIONS_TABLE
            )));
        }

        let mut col_defs = Vec::with_capacity(columns.len());
        for column in &columns {
            let name: String = column
                .try_get("name")
                .map_err(|e| OrchestrationError::SchemaError(e.to_string()))?;
            let declared: String = column
                .try_get("type")
                .map_err(|e| OrchestrationError::SchemaError(e.to_string()))?;
            col_defs.push(format!("{} {}", name, declared));
        }

        Ok(format!("{}({})", TRANSACTIONS_TABLE, col_defs.join(", ")))
    }

    pub async fn insert_transaction(&self, tx: &NewTransaction) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO transactions (date, source, type, category, amount) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&tx.date)
        .bind(&tx.source)
        .bind(tx.kind.as_str())
        .bind(&tx.category)
        .bind(tx.amount)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// First `limit` ledger rows, for debugging ingestion
    pub async fn raw_transactions(&self, limit: i64) -> Result<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, Transaction>(
            "SELECT id, date, source, type, category, amount FROM transactions ORDER BY id LIMIT ?",
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Dated revenue amounts, in the shape the forecast engine expects
    pub async fn monthly_revenue_rows(&self) -> Result<Vec<Row>> {
        let rows = sqlx::query(REVENUE_SERIES_SQL)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_json).collect()
    }
}

/// Statement the revenue forecast endpoint feeds into the engine
pub const REVENUE_SERIES_SQL: &str = "SELECT date, amount FROM transactions WHERE type = 'revenue'";

/// Decode a row into an ordered column → JSON value map by its stored types
pub fn row_to_json(row: &SqliteRow) -> Result<Row> {
    let mut out = Row::new();

    for column in row.columns() {
        let index = column.ordinal();
        let raw = row.try_get_raw(index)?;

        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_string();
            match type_name.as_str() {
                "INTEGER" | "BOOLEAN" => Value::from(row.try_get_unchecked::<i64, _>(index)?),
                "REAL" | "NUMERIC" => {
                    let number = row.try_get_unchecked::<f64, _>(index)?;
                    serde_json::Number::from_f64(number)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
                "BLOB" => Value::String(hex::encode(row.try_get_unchecked::<Vec<u8>, _>(index)?)),
                _ => Value::String(row.try_get_unchecked::<String, _>(index)?),
            }
        };

        out.insert(column.name().to_string(), value);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionType;

    #[tokio::test]
    async fn test_describe_schema_reflects_live_table() {
        let db = Database::connect_in_memory().await.unwrap();
        db.init_schema().await.unwrap();

        let schema = db.describe_schema().await.unwrap();
        assert_eq!(
            schema,
            "transactions(id INTEGER, date VARCHAR, source VARCHAR, type VARCHAR, category VARCHAR, amount FLOAT)"
        );

        sqlx::query("ALTER TABLE transactions ADD COLUMN currency TEXT")
            .execute(db.pool())
            .await
            .unwrap();
        let schema = db.describe_schema().await.unwrap();
        assert!(schema.ends_with("amount FLOAT, currency TEXT)"));
    }

    #[tokio::test]
    async fn test_describe_schema_fails_without_table() {
        let db = Database::connect_in_memory().await.unwrap();
        let err = db.describe_schema().await.unwrap_err();
        assert!(matches!(err, OrchestrationError::SchemaError(_)));
    }

    #[tokio::test]
    async fn test_raw_transactions_round_trip() {
        let db = Database::connect_in_memory().await.unwrap();
        db.init_schema().await.unwrap();
        db.insert_transaction(&NewTransaction::new("2024-01-15", TransactionType::Revenue, "Sales", 1000.0))
            .await
            .unwrap();
        db.insert_transaction(&NewTransaction::new("2024-01-20", TransactionType::Expense, "Payroll", 400.0))
            .await
            .unwrap();

        let rows = db.raw_transactions(1).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, "revenue");
        assert_eq!(rows[0].category, "Sales");

        let revenue = db.monthly_revenue_rows().await.unwrap();
        assert_eq!(revenue.len(), 1);
        assert_eq!(revenue[0]["date"], serde_json::json!("2024-01-15"));
        assert_eq!(revenue[0]["amount"], serde_json::json!(1000.0));
    }

    #[tokio::test]
    async fn test_row_to_json_keeps_column_order_and_types() {
        let db = Database::connect_in_memory().await.unwrap();
        let row = sqlx::query("SELECT '2024-01-31' AS month, 3 AS n, 1.5 AS total, NULL AS missing, x'00ff' AS blob")
            .fetch_one(db.pool())
            .await
            .unwrap();

        let json = row_to_json(&row).unwrap();
        let keys: Vec<&String> = json.keys().collect();
        assert_eq!(keys, vec!["month", "n", "total", "missing", "blob"]);
        assert_eq!(json["month"], serde_json::json!("2024-01-31"));
        assert_eq!(json["n"], serde_json::json!(3));
        assert_eq!(json["total"], serde_json::json!(1.5));
        assert_eq!(json["missing"], Value::Null);
        assert_eq!(json["blob"], serde_json::json!("00ff"));
    }
}
