//! Main orchestrator - one question, one turn
//!
//! INIT → DISPATCH → TOOL EXECUTE → ... → SYNTHESIZE → DONE
//!
//! Any state may fall through to ERROR. Exactly one audit write happens once
//! the response is known.

use crate::audit::{QueryAuditLog, SqliteAuditSink, AGENT_TOOL};
use crate::config::{AppConfig, DEFAULT_MAX_TOOL_ROUNDS};
use crate::error::OrchestrationError;
use crate::forecast::ForecastEngine;
use crate::models::{QueryResponse, ToolOutput};
use crate::prompts::PromptCompiler;
use crate::reasoning::{GeminiReasoner, ModelReply, ReasoningModel, ToolResult, Turn};
use crate::store::Database;
use crate::tools::{
    tool_specs, ForecastTool, SqlGuardTool, ToolCall, ToolExecutor, ToolRequest, Toolbox,
};
use crate::Result;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const MISSING_CREDENTIAL_MESSAGE: &str =
    "GEMINI_API_KEY is missing. Did you create a .env file?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    Init,
    Dispatching,
    ToolExecuting,
    Synthesizing,
    Done,
    Error,
}

fn enter(state: TurnState) {
    debug!(state = ?state, "Turn state");
}

/// What the tools actually did during a turn
#[derive(Debug, Default)]
struct ToolTrace {
    tool: Option<&'static str>,
    sql: Option<String>,
    result: Option<Value>,
}

/// Main orchestrator that answers one question per call
pub struct Orchestrator {
    db: Database,
    prompts: PromptCompiler,
    model: Arc<dyn ReasoningModel>,
    tools: Arc<dyn ToolExecutor>,
    audit: QueryAuditLog,
    max_tool_rounds: usize,
}

impl Orchestrator {
    pub fn new(
        db: Database,
        model: Arc<dyn ReasoningModel>,
        tools: Arc<dyn ToolExecutor>,
        audit: QueryAuditLog,
    ) -> Self {
        Self {
            db,
            prompts: PromptCompiler::new(),
            model,
            tools,
            audit,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }

    /// Production wiring: Gemini, the guarded toolbox and the SQLite audit table
    pub fn from_config(config: &AppConfig, db: Database) -> Result<Self> {
        let sql = SqlGuardTool::new(db.clone());
        let forecast = ForecastTool::new(sql.clone(), ForecastEngine::new(config.arima_order));
        let model = GeminiReasoner::from_config(config)?;
        let audit = QueryAuditLog::new(Arc::new(SqliteAuditSink::new(db.clone())));

        Ok(Self::new(
            db,
            Arc::new(model),
            Arc::new(Toolbox::new(sql, forecast)),
            audit,
        )
        .with_max_tool_rounds(config.max_tool_rounds))
    }

    /// Answer a natural-language question. Never fails; errors are reported
    /// in the response body.
    pub async fn answer(&self, question: &str) -> QueryResponse {
        let turn_id = Uuid::new_v4();
        let span = info_span!("turn", %turn_id);

        async move {
            let start = Instant::now();
            info!(question = %question, "Orchestrator: question received");

            let mut trace = ToolTrace::default();
            let outcome = self.run_turn(question, &mut trace).await;

            let response = match outcome {
                Ok(report) => {
                    enter(TurnState::Done);
                    self.audit
                        .record(
                            question,
                            trace.sql.as_deref(),
                            trace.tool.unwrap_or(AGENT_TOOL),
                            trace.result.as_ref(),
                            &report,
                        )
                        .await;
                    QueryResponse::Answered {
                        question: question.to_string(),
                        report,
                    }
                }
                Err(e) => {
                    enter(TurnState::Error);
                    let message = e.to_string();
                    warn!("Turn failed: {}", message);
                    self.audit
                        .record(
                            question,
                            trace.sql.as_deref(),
                            AGENT_TOOL,
                            trace.result.as_ref(),
                            &format!("ERROR: {}", message),
                        )
                        .await;
                    QueryResponse::Failed { error: message }
                }
            };

            info!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                failed = response.is_error(),
                "Orchestrator: turn complete"
            );
            response
        }
        .instrument(span)
        .await
    }

    async fn run_turn(&self, question: &str, trace: &mut ToolTrace) -> Result<String> {
        enter(TurnState::Init);

        if !self.model.is_configured() {
            return Err(OrchestrationError::MissingCredential(
                MISSING_CREDENTIAL_MESSAGE.to_string(),
            ));
        }

        let schema = self.db.describe_schema().await?;
        let system = self.prompts.compile(&schema).await;
        let specs = tool_specs();

        let mut transcript = vec![Turn::User(question.to_string())];

        for round in 1..=self.max_tool_rounds {
            enter(TurnState::Dispatching);
            debug!(round, "Dispatching to reasoning model");

            match self.model.respond(&system, &transcript, &specs).await? {
                ModelReply::Answer(text) => {
                    enter(TurnState::Synthesizing);
                    return non_empty_report(text);
                }
                ModelReply::ToolCalls(calls) if calls.is_empty() => {
                    return Err(OrchestrationError::SynthesisError(
                        "model returned neither text nor tool calls".to_string(),
                    ));
                }
                ModelReply::ToolCalls(calls) => {
                    enter(TurnState::ToolExecuting);
                    let results = self.execute_calls(&calls, trace).await?;
                    transcript.push(Turn::ToolCalls(calls));
                    transcript.push(Turn::ToolResults(results));
                }
            }
        }

        enter(TurnState::Synthesizing);
        warn!(
            rounds = self.max_tool_rounds,
            "Tool round budget exhausted, requesting final report"
        );

        match self.model.respond(&system, &transcript, &[]).await? {
            ModelReply::Answer(text) => non_empty_report(text),
            ModelReply::ToolCalls(_) => Err(OrchestrationError::SynthesisError(
                "model kept requesting tools after the round budget was exhausted".to_string(),
            )),
        }
    }

    /// Run each call in order. Tool-level failures become `{error}` payloads
    /// for the model; anything else ends the turn.
    async fn execute_calls(
        &self,
        calls: &[ToolCall],
        trace: &mut ToolTrace,
    ) -> Result<Vec<ToolResult>> {
        let mut results = Vec::with_capacity(calls.len());

        for call in calls {
            let output = match ToolRequest::from_call(call) {
                Ok(request) => {
                    trace.tool = Some(request.tool_name());

                    let executed = self.tools.execute(&request).await;

                    // A statement the guard refused never reached the store
                    if !matches!(executed, Err(OrchestrationError::SqlRejected(_))) {
                        trace.sql = Some(request.sql().to_string());
                    }

                    let output = match executed {
                        Ok(output) => output,
                        Err(e) if e.is_recoverable_tool_failure() => {
                            warn!(tool = %call.name, "Tool failed: {}", e);
                            ToolOutput::failed(e.to_string())
                        }
                        Err(e) => return Err(e),
                    };

                    trace.result = Some(output.to_model_payload());
                    output
                }
                Err(e) => {
                    warn!(tool = %call.name, "Invalid tool call: {}", e);
                    ToolOutput::failed(e.to_string())
                }
            };

            debug!(tool = %call.name, success = output.success, "Tool call finished");
            results.push(ToolResult {
                name: call.name.clone(),
                payload: output.to_model_payload(),
            });
        }

        Ok(results)
    }
}

fn non_empty_report(text: String) -> Result<String> {
    if text.trim().is_empty() {
        return Err(OrchestrationError::SynthesisError(
            "model returned an empty report".to_string(),
        ));
    }
    Ok(text)
}
