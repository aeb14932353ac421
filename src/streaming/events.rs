// ABOUTME: Wire events delivered to chat stream subscribers over SSE
// ABOUTME: Covers incremental output, terminal markers and full-message replacement
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AppResult;
use crate::llm::ModelEvent;
use crate::models::Turn;

/// One event in a chat stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    /// Incremental text
    TextDelta {
        /// Appended text
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
    /// Normal end of stream
    Finish {
        /// Backend-reported reason, absent when the producer ended silently
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
    /// Abnormal end of stream
    Error {
        /// Client-safe description
        message: String,
    },
    /// Replace the client's view of the last message with this turn
    MessageReplace {
        /// Full persisted turn
        message: Turn,
    },
}

impl StreamEvent {
    /// Whether no event can follow this one
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finish { .. } | Self::Error { .. } | Self::MessageReplace { .. }
        )
    }

    /// Error terminal event
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Serialize as the payload of an SSE `data:` line
    ///
    /// # Errors
    ///
    /// Returns an error if a tool payload cannot be serialized
    pub fn to_sse_data(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<ModelEvent> for StreamEvent {
    fn from(event: ModelEvent) -> Self {
        match event {
            ModelEvent::TextDelta { delta } => Self::TextDelta { delta },
            ModelEvent::ToolCall {
                tool_call_id,
                tool_name,
                args,
            } => Self::ToolCall {
                tool_call_id,
                tool_name,
                args,
            },
            ModelEvent::ToolResult {
                tool_call_id,
                tool_name,
                result,
            } => Self::ToolResult {
                tool_call_id,
                tool_name,
                result,
            },
            ModelEvent::Finish { finish_reason } => Self::Finish { finish_reason },
        }
    }
}
