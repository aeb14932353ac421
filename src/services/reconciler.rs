// ABOUTME: Reconciles a finished producer's event sequence into one durable assistant turn
// ABOUTME: Runs as a background task that persists strictly after the terminal event
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Reconciliation
//!
//! A producer may decompose its output into several response messages: text
//! and tool calls form an `assistant` message, tool results form a
//! `tool-data` message, and text after a tool result opens a new `assistant`
//! message. Exactly one turn is persisted per stream: the trailing assistant
//! message, with every other message's parts folded into it in emission order.

use std::sync::Arc;

use chrono::Utc;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::database::ChatStore;
use crate::models::{Part, Role, Turn};
use crate::streaming::{StreamEvent, Subscription};

/// Why a stream produced no outbound turn
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconcileError {
    /// The output held no assistant-role message
    #[error("producer output contained no assistant message")]
    NoAssistantMessage,
    /// The stream ended with an error event
    #[error("producer failed: {message}")]
    ProducerFailed {
        /// Message of the terminal error event
        message: String,
    },
    /// The event sequence stopped before any terminal event
    #[error("producer output ended without a terminal event")]
    Unterminated,
}

/// One logical message inside a producer's output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMessage {
    /// `assistant` or `tool-data`
    pub role: Role,
    /// Parts in emission order, adjacent text coalesced
    pub parts: Vec<Part>,
}

impl ResponseMessage {
    const fn new(role: Role) -> Self {
        Self {
            role,
            parts: Vec::new(),
        }
    }

    fn push_text(&mut self, delta: &str) {
        if let Some(Part::Text { text }) = self.parts.last_mut() {
            text.push_str(delta);
        } else {
            self.parts.push(Part::text(delta));
        }
    }
}

/// Continue the open message if it has `role`, otherwise close it and open a new one
fn message_for<'a>(
    open: &'a mut Option<ResponseMessage>,
    closed: &mut Vec<ResponseMessage>,
    role: Role,
) -> &'a mut ResponseMessage {
    if open.as_ref().is_some_and(|m| m.role != role) {
        closed.extend(open.take());
    }
    open.get_or_insert_with(|| ResponseMessage::new(role))
}

/// Split a producer's events into response messages
///
/// # Errors
///
/// Returns [`ReconcileError::ProducerFailed`] if an error event is present and
/// [`ReconcileError::Unterminated`] if no `finish` event closes the sequence
pub fn group_response_messages(
    events: &[StreamEvent],
) -> Result<Vec<ResponseMessage>, ReconcileError> {
    let mut messages: Vec<ResponseMessage> = Vec::new();
    let mut open: Option<ResponseMessage> = None;

    for event in events {
        match event {
            StreamEvent::TextDelta { delta } => {
                message_for(&mut open, &mut messages, Role::Assistant).push_text(delta);
            }
            StreamEvent::ToolCall {
                tool_call_id,
                tool_name,
                args,
            } => message_for(&mut open, &mut messages, Role::Assistant).parts.push(Part::ToolCall {
                tool_call_id: tool_call_id.clone(),
                tool_name: tool_name.clone(),
                args: args.clone(),
            }),
            StreamEvent::ToolResult {
                tool_call_id,
                tool_name,
                result,
            } => message_for(&mut open, &mut messages, Role::ToolData).parts.push(Part::ToolResult {
                tool_call_id: tool_call_id.clone(),
                tool_name: tool_name.clone(),
                result: result.clone(),
            }),
            StreamEvent::Error { message } => {
                return Err(ReconcileError::ProducerFailed {
                    message: message.clone(),
                })
            }
            StreamEvent::Finish { .. } => {
                messages.extend(open);
                return Ok(messages);
            }
            StreamEvent::MessageReplace { .. } => {}
        }
    }

    Err(ReconcileError::Unterminated)
}

/// Build the single outbound turn for a completed stream
///
/// # Errors
///
/// Returns [`ReconcileError::NoAssistantMessage`] when nothing was generated
/// in the assistant role, [`ReconcileError::ProducerFailed`] when the stream
/// ended with an error and [`ReconcileError::Unterminated`] when it stopped
/// without a terminal event
pub fn reconcile_turn(conversation_id: &str, events: &[StreamEvent]) -> Result<Turn, ReconcileError> {
    let messages = group_response_messages(events)?;
    if !messages.iter().any(|m| m.role == Role::Assistant) {
        return Err(ReconcileError::NoAssistantMessage);
    }

    let mut parts: Vec<Part> = Vec::new();
    for message in messages {
        for part in message.parts {
            if let (Some(Part::Text { text }), Part::Text { text: more }) = (parts.last_mut(), &part) {
                text.push_str(more);
                continue;
            }
            parts.push(part);
        }
    }

    Ok(Turn {
        id: Uuid::new_v4().to_string(),
        conversation_id: conversation_id.to_owned(),
        role: Role::Assistant,
        parts,
        attachments: Vec::new(),
        created_at: Utc::now(),
    })
}

/// Observe a stream to completion and persist its outbound turn
///
/// Failures never reach the client: a missing assistant message, a failed
/// producer and store errors (including writes for a conversation deleted
/// mid-stream) are logged and dropped.
pub fn spawn_reconciliation(
    store: Arc<dyn ChatStore>,
    conversation_id: String,
    subscription: Subscription,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let stream_id = subscription.stream_id().to_owned();
        let events: Vec<StreamEvent> = subscription.collect().await;

        let turn = match reconcile_turn(&conversation_id, &events) {
            Ok(turn) => turn,
            Err(ReconcileError::NoAssistantMessage) => {
                warn!(
                    stream.id = %stream_id,
                    conversation.id = %conversation_id,
                    "Producer output had no assistant message, nothing persisted"
                );
                return;
            }
            Err(ReconcileError::Unterminated) => {
                warn!(
                    stream.id = %stream_id,
                    conversation.id = %conversation_id,
                    "Stream ended without a terminal event, nothing persisted"
                );
                return;
            }
            Err(ReconcileError::ProducerFailed { message }) => {
                info!(
                    stream.id = %stream_id,
                    conversation.id = %conversation_id,
                    "Skipping reconciliation of failed stream: {message}"
                );
                return;
            }
        };

        let turn_id = turn.id.clone();
        match store.append_turns(&[turn]).await {
            Ok(()) => info!(
                stream.id = %stream_id,
                conversation.id = %conversation_id,
                turn.id = %turn_id,
                "Assistant turn persisted"
            ),
            Err(e) => error!(
                stream.id = %stream_id,
                conversation.id = %conversation_id,
                "Failed to persist assistant turn: {e}"
            ),
        }
    })
}
