// ABOUTME: Turn (message) model with role, ordered content parts and attachments
// ABOUTME: Turns are immutable once persisted and ordered by creation timestamp
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AppError;

/// Author of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Inbound message from the caller
    User,
    /// Generated response
    Assistant,
    /// Instruction message
    System,
    /// Tool output produced while generating a response
    ToolData,
}

impl Role {
    /// Convert to string for database storage
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::ToolData => "tool-data",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            "tool-data" => Ok(Self::ToolData),
            _ => Err(AppError::invalid_input(format!("Invalid role: {s}"))),
        }
    }
}

/// One content part of a turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Part {
    /// Plain text span
    Text {
        /// Text content
        text: String,
    },
    /// Invocation of a tool by the generative process
    ToolCall {
        /// Correlates the call with its result
        tool_call_id: String,
        /// Tool name
        tool_name: String,
        /// Tool arguments
        args: Value,
    },
    /// Output of a tool invocation
    ToolResult {
        /// Call this result answers
        tool_call_id: String,
        /// Tool name
        tool_name: String,
        /// Tool output
        result: Value,
    },
}

impl Part {
    /// Build a text part
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Text of this part, if it is a text span
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::ToolCall { .. } | Self::ToolResult { .. } => None,
        }
    }
}

/// Opaque file reference attached to a turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Location of the blob
    pub url: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// MIME type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// One persisted message of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Stable message ID
    pub id: String,
    /// Owning conversation
    pub conversation_id: String,
    /// Author role
    pub role: Role,
    /// Ordered content parts
    pub parts: Vec<Part>,
    /// Attached blobs
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// First non-blank text part, used for titles and previews
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .find(|text| !text.trim().is_empty())
    }

    /// All text parts joined in order
    #[must_use]
    pub fn text(&self) -> String {
        self.parts.iter().filter_map(Part::as_text).collect()
    }
}
