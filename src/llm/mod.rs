// ABOUTME: Generative model abstraction producing ordered output event streams
// ABOUTME: Defines the GenerativeModel contract, its event vocabulary and backend selection
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Generative Model Interface
//!
//! The chat coordinator treats the model as an opaque producer: it hands over a
//! system prompt, the conversation so far and a tool set, and receives a lazy
//! sequence of [`ModelEvent`]s. Backends:
//!
//! - [`OpenAiCompatibleModel`]: any `OpenAI`-compatible `chat/completions` endpoint
//!   (Ollama, vLLM, `LocalAI`, hosted `OpenAI`) with streaming
//! - [`ScriptedModel`]: deterministic event script for tests and demos
//!
//! ## Example
//!
//! ```rust,no_run
//! use futures_util::StreamExt;
//! use threadline_server::llm::{GenerationRequest, GenerativeModel, ScriptedModel};
//!
//! # async fn example() {
//! let model = ScriptedModel::text(["Hello", " there"]);
//! let request = GenerationRequest::new("You are helpful.", Vec::new());
//! let mut events = model.run(request).await.unwrap();
//! while let Some(event) = events.next().await {
//!     println!("{event:?}");
//! }
//! # }
//! ```

mod openai_compatible;
pub mod prompts;
mod scripted;
pub mod sse_parser;

pub use openai_compatible::OpenAiCompatibleModel;
pub use prompts::{system_prompt, RequestHints};
pub use scripted::ScriptedModel;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_stream::Stream;
use tracing::info;

use crate::config::{LlmConfig, LlmProviderType};
use crate::errors::AppResult;
use crate::models::Turn;

/// One unit of model output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ModelEvent {
    /// Incremental text
    TextDelta {
        /// Text appended to the current response message
        delta: String,
    },
    /// The model invoked a tool
    ToolCall {
        /// Correlates the call with its result
        tool_call_id: String,
        /// Tool name
        tool_name: String,
        /// Tool arguments
        args: Value,
    },
    /// A tool produced output
    ToolResult {
        /// Call this result answers
        tool_call_id: String,
        /// Tool name
        tool_name: String,
        /// Tool output
        result: Value,
    },
    /// Generation ended normally
    Finish {
        /// Backend-reported reason (stop, length, `tool_calls`)
        finish_reason: Option<String>,
    },
}

impl ModelEvent {
    /// Text delta helper
    #[must_use]
    pub fn text(delta: impl Into<String>) -> Self {
        Self::TextDelta {
            delta: delta.into(),
        }
    }

    /// Normal terminal event
    #[must_use]
    pub fn finish() -> Self {
        Self::Finish {
            finish_reason: Some("stop".to_owned()),
        }
    }
}

/// Tool made available to the model, passed through without interpretation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Tool name
    pub name: String,
    /// What the tool does
    pub description: String,
    /// JSON schema of the arguments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// Tools offered for one generation
pub type ToolSet = Vec<ToolDeclaration>;

/// Input to one generation run
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Instruction prompt
    pub system_prompt: String,
    /// Conversation history including the newest user turn
    pub turns: Vec<Turn>,
    /// Tools the model may call
    pub tools: ToolSet,
    /// Model selector, backend default when `None`
    pub model: Option<String>,
}

impl GenerationRequest {
    /// Create a request without tools using the backend's default model
    #[must_use]
    pub fn new(system_prompt: impl Into<String>, turns: Vec<Turn>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            turns,
            tools: Vec::new(),
            model: None,
        }
    }

    /// Select a model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Offer tools
    #[must_use]
    pub fn with_tools(mut self, tools: ToolSet) -> Self {
        self.tools = tools;
        self
    }
}

/// Lazy, ordered model output
pub type ModelEventStream = Pin<Box<dyn Stream<Item = AppResult<ModelEvent>> + Send>>;

/// A generative process producing an ordered event sequence
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Backend identifier for logs
    fn name(&self) -> &'static str;

    /// Start generating
    ///
    /// Errors returned here happen before any output; errors yielded by the
    /// stream happen mid-generation.
    async fn run(&self, request: GenerationRequest) -> AppResult<ModelEventStream>;
}

/// Build the configured model backend
///
/// # Errors
///
/// Returns an error if the HTTP client for a remote backend cannot be created
pub fn build_model(config: &LlmConfig) -> AppResult<Arc<dyn GenerativeModel>> {
    info!(
        "Initializing {} model backend (default model {})",
        config.provider, config.default_model
    );
    match config.provider {
        LlmProviderType::OpenAi => Ok(Arc::new(OpenAiCompatibleModel::new(config)?)),
        LlmProviderType::Scripted => Ok(Arc::new(ScriptedModel::echo())),
    }
}
