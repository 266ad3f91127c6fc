//! Financial Query Agent
//!
//! Answers natural-language questions about a ledger of categorized
//! transactions:
//! - Describes the live schema and compiles the analyst system prompt
//! - Lets the model call a read-only SQL tool and an ARIMA forecast tool
//! - Returns a Markdown report or a structured error
//! - Records every turn in the query audit log
//!
//! TURN LOOP:
//! INIT → DISPATCH → TOOL EXECUTE → ... → SYNTHESIZE → DONE | ERROR

pub mod agent;
pub mod api;
pub mod audit;
pub mod config;
pub mod error;
pub mod forecast;
pub mod gemini;
pub mod models;
pub mod prompts;
pub mod reasoning;
pub mod store;
pub mod tools;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use agent::Orchestrator;
