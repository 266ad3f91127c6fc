//! System instruction for the financial analyst agent
//!
//! The prompt depends only on the schema string, so compiled prompts are
//! cached by a SHA-256 fingerprint of that string.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const STYLE_EXAMPLES: &[&str] = &[
    "Revenue increased by 10% in Q2, primarily driven by strong sales growth.",
    "Operating expenses rose 15% due to increased payroll and office costs.",
    "Cash flow improved significantly with better collection rates.",
];

/// Build the agent's system instruction with `schema` embedded verbatim
pub fn build_agent_prompt(schema: &str) -> String {
    let signatures = [
        "sql_query(sql: str) → run read-only SQL queries on the transactions table.",
        "forecast_arima(sql: str, horizon: int, target: str) → run ARIMA forecasts on monthly totals.",
    ];

    let tool_lines: Vec<String> = signatures
        .iter()
        .enumerate()
        .map(|(i, sig)| format!("{}. {}", i + 1, sig))
        .collect();

    let style_lines: Vec<String> = STYLE_EXAMPLES
        .iter()
        .map(|example| format!("- \"{}\"", example))
        .collect();

    format!(
        r#"You are a senior financial analyst.

Database schema:
{schema}

You have two tools available:
{tools}

Guidelines:
- Use the schema exactly when writing SQL.
- Only use SELECT queries; never modify data.
- Call tools to fetch data as needed. If a tool returns an error, correct the call and try again.
- For forecast_arima, the first selected column must be the date and the target must be a numeric column.
- Always respond to the user with a **Markdown financial report**.
- Use ## headings and bullet points for clarity.
- Integrate numbers, percentages, and trends.
- For forecasts, separate historical vs predicted values.
- Never just dump raw JSON/SQL.

Style examples:
{styles}
"#,
        schema = schema,
        tools = tool_lines.join("\n"),
        styles = style_lines.join("\n"),
    )
}

/// Hex SHA-256 of a schema description
pub fn schema_fingerprint(schema: &str) -> String {
    hex::encode(Sha256::digest(schema.as_bytes()))
}

/// Compiled prompts keyed by schema fingerprint
#[derive(Default, Clone)]
pub struct PromptCompiler {
    cache: Arc<RwLock<HashMap<String, Arc<str>>>>,
}

impl PromptCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the system instruction for `schema`, compiling it at most once
    pub async fn compile(&self, schema: &str) -> Arc<str> {
        let key = schema_fingerprint(schema);

        if let Some(prompt) = self.cache.read().await.get(&key) {
            return Arc::clone(prompt);
        }

        let mut cache = self.cache.write().await;
        Arc::clone(
            cache
                .entry(key)
                .or_insert_with(|| Arc::from(build_agent_prompt(schema))),
        )
    }

    pub async fn cached_len(&self) -> usize {
        self.cache.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = "transactions(id INTEGER, date VARCHAR, amount FLOAT)";

    #[test]
    fn test_prompt_contents() {
        let prompt = build_agent_prompt(SCHEMA);
        assert!(prompt.contains("senior financial analyst"));
        assert!(prompt.contains(SCHEMA));
        assert!(prompt.contains("1. sql_query(sql: str)"));
        assert!(prompt.contains("2. forecast_arima(sql: str, horizon: int, target: str)"));
        assert!(prompt.contains("Only use SELECT queries"));
        assert!(prompt.contains("Markdown financial report"));
        assert!(prompt.contains("Never just dump raw JSON/SQL"));
        for example in STYLE_EXAMPLES {
            assert!(prompt.contains(example));
        }
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(schema_fingerprint(SCHEMA), schema_fingerprint(SCHEMA));
        assert_ne!(schema_fingerprint(SCHEMA), schema_fingerprint("transactions(id INTEGER)"));
        assert_eq!(schema_fingerprint(SCHEMA).len(), 64);
    }

    #[tokio::test]
    async fn test_compiler_caches_by_schema() {
        let compiler = PromptCompiler::new();
        let first = compiler.compile(SCHEMA).await;
        let second = compiler.compile(SCHEMA).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(compiler.cached_len().await, 1);

        let other = compiler.compile("transactions(id INTEGER)").await;
        assert!(other.contains("transactions(id INTEGER)"));
        assert_eq!(compiler.cached_len().await, 2);
    }
}
