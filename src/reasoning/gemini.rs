//! Gemini-backed reasoning model
//!
//! Maps the transcript onto Gemini `contents` and declares the agent tools
//! as function declarations.

use super::{ModelReply, ReasoningModel, ToolResult, Turn};
use crate::error::OrchestrationError;
use crate::gemini::{
    Content, FunctionCall, FunctionDeclaration, FunctionResponse, GeminiClient,
    GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part, SystemInstruction,
    ToolDeclarations,
};
use crate::tools::{ToolCall, ToolSpec};
use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

pub struct GeminiReasoner {
    client: GeminiClient,
}

impl GeminiReasoner {
    pub fn new(api_key: String, model: String, base_url: String) -> Result<Self> {
        Ok(Self {
            client: GeminiClient::new(api_key, model, base_url)?,
        })
    }

    pub fn from_config(config: &crate::config::AppConfig) -> Result<Self> {
        Self::new(
            config.gemini_api_key.clone(),
            config.gemini_model.clone(),
            config.gemini_base_url.clone(),
        )
    }

    fn build_request(system: &str, transcript: &[Turn], tools: &[ToolSpec]) -> GenerateContentRequest {
        let contents = transcript.iter().map(turn_to_content).collect();

        let tools = if tools.is_empty() {
            Vec::new()
        } else {
            vec![ToolDeclarations {
                function_declarations: tools
                    .iter()
                    .map(|spec| FunctionDeclaration {
                        name: spec.name.to_string(),
                        description: spec.description.to_string(),
                        parameters: spec.parameters.clone(),
                    })
                    .collect(),
            }]
        };

        GenerateContentRequest {
            contents,
            system_instruction: SystemInstruction {
                parts: vec![Part::text(system)],
            },
            tools,
            generation_config: GenerationConfig::default(),
        }
    }
}

fn turn_to_content(turn: &Turn) -> Content {
    match turn {
        Turn::User(text) => Content {
            role: Some("user".to_string()),
            parts: vec![Part::text(text.clone())],
        },
        Turn::ToolCalls(calls) => Content {
            role: Some("model".to_string()),
            parts: calls
                .iter()
                .map(|call| Part {
                    function_call: Some(FunctionCall {
                        name: call.name.clone(),
                        args: call.args.clone(),
                    }),
                    ..Default::default()
                })
                .collect(),
        },
        Turn::ToolResults(results) => Content {
            role: Some("user".to_string()),
            parts: results.iter().map(result_part).collect(),
        },
    }
}

// functionResponse.response has to be an object
fn result_part(result: &ToolResult) -> Part {
    let response = match &result.payload {
        Value::Object(_) => result.payload.clone(),
        other => json!({ "result": other }),
    };

    Part {
        function_response: Some(FunctionResponse {
            name: result.name.clone(),
            response,
        }),
        ..Default::default()
    }
}

fn parse_reply(response: GenerateContentResponse) -> Result<ModelReply> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| OrchestrationError::LlmError("Gemini returned no candidates".to_string()))?;

    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();

    let calls: Vec<ToolCall> = parts
        .iter()
        .filter_map(|part| part.function_call.as_ref())
        .map(|call| ToolCall {
            name: call.name.clone(),
            args: call.args.clone(),
        })
        .collect();

    if !calls.is_empty() {
        return Ok(ModelReply::ToolCalls(calls));
    }

    let text: String = parts
        .iter()
        .filter_map(|part| part.text.as_deref())
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        return Err(OrchestrationError::SynthesisError(format!(
            "Gemini returned an empty answer (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    Ok(ModelReply::Answer(text))
}

#[async_trait]
impl ReasoningModel for GeminiReasoner {
    fn is_configured(&self) -> bool {
        self.client.has_api_key()
    }

    async fn respond(
        &self,
        system: &str,
        transcript: &[Turn],
        tools: &[ToolSpec],
    ) -> Result<ModelReply> {
        let request = Self::build_request(system, transcript, tools);
        let response = self.client.generate_content(&request).await?;

        if let Some(usage) = &response.usage_metadata {
            debug!(
                prompt_tokens = ?usage.prompt_token_count,
                output_tokens = ?usage.candidates_token_count,
                "Gemini usage"
            );
        }

        parse_reply(response)
    }
}
