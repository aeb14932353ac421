// ABOUTME: Streaming model backend for OpenAI-compatible chat completion APIs
// ABOUTME: Works with Ollama, vLLM, LocalAI and hosted OpenAI, assembling streamed tool calls
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # `OpenAI`-Compatible Backend
//!
//! Sends `POST {base_url}/chat/completions` with `stream: true` and converts the
//! SSE response into [`ModelEvent`]s. Tool call arguments arrive as string
//! fragments keyed by index; they are accumulated until the choice reports a
//! finish reason and then emitted as complete tool calls.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use super::sse_parser::{create_sse_stream, SseEvent};
use super::{GenerationRequest, GenerativeModel, ModelEvent, ModelEventStream, ToolDeclaration};
use crate::config::LlmConfig;
use crate::constants::llm::{CONNECT_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS};
use crate::errors::{AppError, AppResult};
use crate::models::{Role, Turn};

const SERVICE_NAME: &str = "LLM";

// ============================================================================
// API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAiTool>,
}

#[derive(Debug, Clone, Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: OpenAiFunction,
}

#[derive(Debug, Clone, Serialize)]
struct OpenAiFunction {
    name: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
}

impl From<&ToolDeclaration> for OpenAiTool {
    fn from(tool: &ToolDeclaration) -> Self {
        Self {
            tool_type: "function",
            function: OpenAiFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct OpenAiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OpenAiToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct OpenAiToolCallDelta {
    #[serde(default)]
    index: u32,
    id: Option<String>,
    #[serde(default)]
    function: OpenAiFunctionDelta,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

// ============================================================================
// Stream assembly
// ============================================================================

/// Tool call whose arguments are still arriving
#[derive(Debug, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Converts SSE payloads into model events, buffering tool call fragments
#[derive(Debug, Default)]
struct ChunkAssembler {
    tool_calls: BTreeMap<u32, PendingToolCall>,
    finished: bool,
}

impl ChunkAssembler {
    fn handle(&mut self, event: SseEvent) -> Vec<AppResult<ModelEvent>> {
        match event {
            SseEvent::Done => self.finish(Some("stop".to_owned())),
            SseEvent::Data(json) => match serde_json::from_str::<OpenAiStreamChunk>(&json) {
                Ok(chunk) => self.apply(chunk),
                Err(e) => {
                    warn!("Failed to parse stream chunk: {e}");
                    Vec::new()
                }
            },
        }
    }

    fn apply(&mut self, chunk: OpenAiStreamChunk) -> Vec<AppResult<ModelEvent>> {
        let Some(choice) = chunk.choices.into_iter().next() else {
            return Vec::new();
        };

        let mut events = Vec::new();
        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            events.push(Ok(ModelEvent::TextDelta { delta: content }));
        }

        for fragment in choice.delta.tool_calls {
            let pending = self.tool_calls.entry(fragment.index).or_default();
            if let Some(id) = fragment.id {
                pending.id = id;
            }
            if let Some(name) = fragment.function.name {
                pending.name.push_str(&name);
            }
            if let Some(arguments) = fragment.function.arguments {
                pending.arguments.push_str(&arguments);
            }
        }

        if choice.finish_reason.is_some() {
            events.extend(self.finish(choice.finish_reason));
        }
        events
    }

    /// Flush buffered tool calls and emit the terminal event once
    fn finish(&mut self, finish_reason: Option<String>) -> Vec<AppResult<ModelEvent>> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut events: Vec<AppResult<ModelEvent>> = std::mem::take(&mut self.tool_calls)
            .into_values()
            .map(|call| {
                let args = serde_json::from_str(&call.arguments)
                    .unwrap_or(Value::String(call.arguments));
                Ok(ModelEvent::ToolCall {
                    tool_call_id: call.id,
                    tool_name: call.name,
                    args,
                })
            })
            .collect();
        events.push(Ok(ModelEvent::Finish { finish_reason }));
        events
    }
}

// ============================================================================
// Backend
// ============================================================================

/// Streaming client for `OpenAI`-compatible endpoints
pub struct OpenAiCompatibleModel {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    default_model: String,
}

impl OpenAiCompatibleModel {
    /// Create a backend from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created
    pub fn new(config: &LlmConfig) -> AppResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            default_model: config.default_model.clone(),
        })
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint)
    }

    /// Map persisted turns to API messages; tool output turns carry no prose
    fn convert_messages(system_prompt: &str, turns: &[Turn]) -> Vec<OpenAiMessage> {
        let mut messages = vec![OpenAiMessage {
            role: "system",
            content: system_prompt.to_owned(),
        }];
        messages.extend(turns.iter().filter_map(|turn| {
            let role = match turn.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
                Role::ToolData => return None,
            };
            let content = turn.text();
            (!content.is_empty()).then_some(OpenAiMessage { role, content })
        }));
        messages
    }

    fn parse_error_response(status: StatusCode, body: &str) -> AppError {
        let detail = serde_json::from_str::<OpenAiErrorResponse>(body).map_or_else(
            |_| body.chars().take(200).collect::<String>(),
            |r| r.error.message,
        );
        match status.as_u16() {
            401 | 403 => AppError::external_service(
                SERVICE_NAME,
                format!("Model API authentication failed: {detail}"),
            ),
            404 => AppError::external_service(
                SERVICE_NAME,
                format!("Model or endpoint not found: {detail}"),
            ),
            _ => AppError::external_service(SERVICE_NAME, format!("API error ({status}): {detail}")),
        }
    }
}

#[async_trait]
impl GenerativeModel for OpenAiCompatibleModel {
    fn name(&self) -> &'static str {
        "openai-compatible"
    }

    #[instrument(skip(self, request), fields(model = %request.model.as_deref().unwrap_or(&self.default_model)))]
    async fn run(&self, request: GenerationRequest) -> AppResult<ModelEventStream> {
        let body = OpenAiRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.default_model.clone()),
            messages: Self::convert_messages(&request.system_prompt, &request.turns),
            stream: true,
            tools: request.tools.iter().map(OpenAiTool::from).collect(),
        };
        debug!(
            "Sending streaming completion with {} messages and {} tools",
            body.messages.len(),
            body.tools.len()
        );

        let mut http_request = self.client.post(self.api_url("chat/completions")).json(&body);
        if let Some(api_key) = &self.api_key {
            http_request = http_request.bearer_auth(api_key);
        }

        let response = http_request.send().await.map_err(|e| {
            error!("Failed to send completion request: {e}");
            if e.is_connect() {
                AppError::external_service(
                    SERVICE_NAME,
                    format!("Cannot connect to model server at {}", self.base_url),
                )
            } else {
                AppError::external_service(SERVICE_NAME, format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::parse_error_response(status, &body));
        }

        let mut assembler = ChunkAssembler::default();
        Ok(create_sse_stream(
            response.bytes_stream(),
            move |event| assembler.handle(event),
            SERVICE_NAME,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    use crate::models::Part;

    fn data(value: &Value) -> SseEvent {
        SseEvent::Data(value.to_string())
    }

    #[test]
    fn test_text_deltas_and_finish() {
        let mut assembler = ChunkAssembler::default();
        let first = assembler.handle(data(&json!({
            "choices": [{"delta": {"content": "Hel"}, "finish_reason": null}]
        })));
        let last = assembler.handle(data(&json!({
            "choices": [{"delta": {"content": "lo"}, "finish_reason": "stop"}]
        })));
        let done = assembler.handle(SseEvent::Done);

        assert_eq!(first.into_iter().map(Result::unwrap).collect::<Vec<_>>(), vec![ModelEvent::text("Hel")]);
        assert_eq!(
            last.into_iter().map(Result::unwrap).collect::<Vec<_>>(),
            vec![ModelEvent::text("lo"), ModelEvent::finish()]
        );
        assert!(done.is_empty());
    }

    #[test]
    fn test_tool_call_fragments_are_assembled() {
        let mut assembler = ChunkAssembler::default();
        assembler.handle(data(&json!({
            "choices": [{"delta": {"tool_calls": [
                {"index": 0, "id": "call_1", "function": {"name": "get_weather", "arguments": "{\"city\":"}}
            ]}}]
        })));
        assembler.handle(data(&json!({
            "choices": [{"delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "\"Oslo\"}"}}
            ]}}]
        })));
        let events: Vec<ModelEvent> = assembler
            .handle(data(&json!({
                "choices": [{"delta": {}, "finish_reason": "tool_calls"}]
            })))
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(
            events,
            vec![
                ModelEvent::ToolCall {
                    tool_call_id: "call_1".to_owned(),
                    tool_name: "get_weather".to_owned(),
                    args: json!({"city": "Oslo"}),
                },
                ModelEvent::Finish {
                    finish_reason: Some("tool_calls".to_owned())
                },
            ]
        );
    }

    #[test]
    fn test_malformed_chunk_is_skipped() {
        let mut assembler = ChunkAssembler::default();
        assert!(assembler.handle(SseEvent::Data("{not json".to_owned())).is_empty());
    }

    #[test]
    fn test_convert_messages_skips_tool_data() {
        let turn = |role, text: &str| Turn {
            id: "t".to_owned(),
            conversation_id: "c".to_owned(),
            role,
            parts: vec![Part::text(text)],
            attachments: Vec::new(),
            created_at: Utc::now(),
        };
        let messages = OpenAiCompatibleModel::convert_messages(
            "sys",
            &[
                turn(Role::User, "hi"),
                turn(Role::ToolData, "ignored"),
                turn(Role::Assistant, "hello"),
            ],
        );
        let roles: Vec<&str> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
    }
}
