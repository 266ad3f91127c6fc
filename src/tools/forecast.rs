//! `forecast_arima` tool: guarded SQL fetch followed by the forecast engine

use super::sql_guard::SqlGuardTool;
use crate::error::OrchestrationError;
use crate::forecast::{ForecastEngine, ForecastError, ForecastResult};
use crate::Result;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct ForecastTool {
    sql: SqlGuardTool,
    engine: ForecastEngine,
}

impl ForecastTool {
    pub fn new(sql: SqlGuardTool, engine: ForecastEngine) -> Self {
        Self { sql, engine }
    }

    pub fn engine(&self) -> ForecastEngine {
        self.engine
    }

    /// Fetch rows with `sql` and forecast `target` for `horizon` months
    pub async fn run(&self, sql: &str, horizon: usize, target: &str) -> Result<ForecastResult> {
        let rows = self.sql.query(sql).await?;
        debug!(row_count = rows.len(), target = %target, horizon, "Fitting forecast");

        let engine = self.engine;
        let target = target.to_string();

        // Model fitting is CPU-bound
        let result = tokio::task::spawn_blocking(move || engine.forecast(&rows, &target, horizon))
            .await
            .map_err(|e| {
                OrchestrationError::Forecast(ForecastError::FitFailed(format!(
                    "fitting task aborted: {}",
                    e
                )))
            })??;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewTransaction, TransactionType};
    use crate::store::Database;

    async fn tool_with(rows: &[(&str, TransactionType, f64)]) -> ForecastTool {
        let db = Database::connect_in_memory().await.unwrap();
        db.init_schema().await.unwrap();
        for (date, kind, amount) in rows {
            db.insert_transaction(&NewTransaction::new(date, *kind, "Sales", *amount))
                .await
                .unwrap();
        }
        ForecastTool::new(SqlGuardTool::new(db), ForecastEngine::default())
    }

    #[tokio::test]
    async fn test_forecast_from_store() {
        let tool = tool_with(&[
            ("2024-01-15", TransactionType::Revenue, 1000.0),
            ("2024-02-10", TransactionType::Revenue, 1200.0),
            ("2024-03-05", TransactionType::Revenue, 900.0),
            ("2024-03-06", TransactionType::Expense, 50.0),
        ])
        .await;

        let result = tool
            .run(
                "SELECT date, amount FROM transactions WHERE type = 'revenue' ORDER BY date",
                2,
                "amount",
            )
            .await
            .unwrap();

        assert_eq!(result.history.len(), 3);
        assert_eq!(result.history[2].1, 900.0);
        assert_eq!(result.forecast.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_result_is_no_data() {
        let tool = tool_with(&[]).await;
        let err = tool
            .run("SELECT date, amount FROM transactions", 3, "amount")
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::Forecast(ForecastError::NoData)));
    }

    #[tokio::test]
    async fn test_write_statement_rejected_before_forecast() {
        let tool = tool_with(&[("2024-01-15", TransactionType::Revenue, 1.0)]).await;
        let err = tool
            .run("DELETE FROM transactions", 3, "amount")
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::SqlRejected(_)));
    }
}
