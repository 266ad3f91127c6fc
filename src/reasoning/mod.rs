//! Reasoning model boundary
//!
//! The orchestrator talks to the language model only through this trait.
//! The model is opaque: it sees the system instruction, the transcript and
//! the tool declarations, and answers with text or tool calls.

use crate::error::OrchestrationError;
use crate::tools::{ToolCall, ToolSpec};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub mod gemini;
pub use gemini::GeminiReasoner;

/// Result of one executed tool call, as fed back to the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub name: String,
    pub payload: Value,
}

/// One entry of the per-question conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Turn {
    User(String),
    ToolCalls(Vec<ToolCall>),
    ToolResults(Vec<ToolResult>),
}

/// What the model wants next
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ModelReply {
    Answer(String),
    ToolCalls(Vec<ToolCall>),
}

/// Trait for the reasoning model (LLM controlled)
#[async_trait]
pub trait ReasoningModel: Send + Sync {
    /// Whether a credential is present; checked before any call is made
    fn is_configured(&self) -> bool;

    /// Ask for the next step. An empty `tools` slice means text only.
    async fn respond(
        &self,
        system: &str,
        transcript: &[Turn],
        tools: &[ToolSpec],
    ) -> Result<ModelReply>;
}

/// Scripted model for development & testing
pub struct MockReasoner {
    configured: bool,
    replies: Mutex<VecDeque<Result<ModelReply>>>,
    calls: AtomicUsize,
    offered_tools: Mutex<Vec<usize>>,
    transcripts: Mutex<Vec<Vec<Turn>>>,
}

impl MockReasoner {
    pub fn new(replies: Vec<ModelReply>) -> Self {
        Self::with_results(replies.into_iter().map(Ok).collect())
    }

    pub fn with_results(replies: Vec<Result<ModelReply>>) -> Self {
        Self {
            configured: true,
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
            offered_tools: Mutex::new(Vec::new()),
            transcripts: Mutex::new(Vec::new()),
        }
    }

    /// A model with no credential
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new(Vec::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of tools offered on each call, in order
    pub fn offered_tools(&self) -> Vec<usize> {
        self.offered_tools
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn transcripts(&self) -> Vec<Vec<Turn>> {
        self.transcripts
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReasoningModel for MockReasoner {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn respond(
        &self,
        _system: &str,
        transcript: &[Turn],
        tools: &[ToolSpec],
    ) -> Result<ModelReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Ok(mut offered) = self.offered_tools.lock() {
            offered.push(tools.len());
        }
        if let Ok(mut transcripts) = self.transcripts.lock() {
            transcripts.push(transcript.to_vec());
        }

        let next = self
            .replies
            .lock()
            .map_err(|_| OrchestrationError::LlmError("mock reasoner poisoned".to_string()))?
            .pop_front();

        next.unwrap_or_else(|| {
            Err(OrchestrationError::LlmError(
                "mock reasoner has no scripted reply left".to_string(),
            ))
        })
    }
}
