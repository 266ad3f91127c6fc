//! Read-only SQL execution against the transaction store
//!
//! Statements are checked before they reach the engine: one statement,
//! `SELECT`/`WITH` only, no write or DDL keywords. Accepted statements run in
//! a transaction that is always rolled back.

use crate::error::OrchestrationError;
use crate::models::Row;
use crate::store::{row_to_json, Database};
use crate::Result;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

lazy_static! {
    static ref WORD: Regex = Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("valid regex");
}

/// Keywords that must never appear in a statement the agent runs
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "REPLACE", "TRUNCATE", "ATTACH",
    "DETACH", "PRAGMA", "VACUUM", "REINDEX", "GRANT", "REVOKE", "MERGE", "UPSERT",
];

const ALLOWED_LEADING: &[&str] = &["SELECT", "WITH"];

/// Check that `sql` is a single read-only statement.
///
/// Returns the statement with a trailing `;` removed.
pub fn validate_select(sql: &str) -> Result<String> {
    let trimmed = sql.trim();
    let statement = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();

    let code = strip_literals_and_comments(statement)?;

    if code.trim().is_empty() {
        return Err(OrchestrationError::SqlRejected("empty statement".to_string()));
    }

    if code.contains(';') {
        return Err(OrchestrationError::SqlRejected(
            "multiple statements are not allowed".to_string(),
        ));
    }

    let mut words = WORD.find_iter(&code).map(|m| m.as_str().to_ascii_uppercase());

    match words.next() {
        Some(first) if ALLOWED_LEADING.contains(&first.as_str()) => {}
        Some(first) => {
            return Err(OrchestrationError::SqlRejected(format!(
                "only SELECT queries are allowed, got {}",
                first
            )))
        }
        None => {
            return Err(OrchestrationError::SqlRejected(
                "statement has no keywords".to_string(),
            ))
        }
    }

    if let Some(keyword) = words.find(|w| FORBIDDEN_KEYWORDS.contains(&w.as_str())) {
        return Err(OrchestrationError::SqlRejected(format!(
            "{} is not allowed in read-only queries",
            keyword
        )));
    }

    Ok(statement.to_string())
}

/// Blank out string literals, quoted identifiers and comments so keyword
/// checks only see SQL code.
fn strip_literals_and_comments(sql: &str) -> Result<String> {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                let mut closed = false;
                while let Some(inner) = chars.next() {
                    if inner == c {
                        // doubled quote is an escaped quote
                        if chars.peek() == Some(&c) {
                            chars.next();
                            continue;
                        }
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(OrchestrationError::SqlRejected(
                        "unterminated quoted string".to_string(),
                    ));
                }
                out.push_str(" '' ");
            }
            '[' => {
                if !chars.by_ref().any(|inner| inner == ']') {
                    return Err(OrchestrationError::SqlRejected(
                        "unterminated bracketed identifier".to_string(),
                    ));
                }
                out.push_str(" x ");
            }
            '-' if chars.peek() == Some(&'-') => {
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        break;
                    }
                }
                out.push(' ');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut previous = '\0';
                let mut closed = false;
                for inner in chars.by_ref() {
                    if previous == '*' && inner == '/' {
                        closed = true;
                        break;
                    }
                    previous = inner;
                }
                if !closed {
                    return Err(OrchestrationError::SqlRejected(
                        "unterminated comment".to_string(),
                    ));
                }
                out.push(' ');
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

/// Runs validated read-only statements
#[derive(Clone, Debug)]
pub struct SqlGuardTool {
    db: Database,
}

impl SqlGuardTool {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Validate and execute `sql`, returning rows in result order
    pub async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        let statement = validate_select(sql).map_err(|e| {
            warn!(sql = %sql, "Rejected statement: {}", e);
            e
        })?;

        // Connection is scoped to this call; the transaction never commits
        let mut tx = self.db.pool().begin().await?;
        let fetched = sqlx::query(&statement).fetch_all(&mut *tx).await;
        tx.rollback().await?;

        let rows = fetched?
            .iter()
            .map(row_to_json)
            .collect::<Result<Vec<Row>>>()?;

        debug!(row_count = rows.len(), "SQL query executed");
        Ok(rows)
    }
}
