// ABOUTME: Request coordinator for creating, resuming and deleting chat streams
// ABOUTME: Enforces validation, turn quota and ownership before any state changes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Chat Coordinator
//!
//! Entry point for every chat operation. Creating a stream runs
//! `validated → quota-checked → conversation-ensured → turn-persisted →
//! stream-started`; everything before `stream-started` fails with a plain
//! error response and leaves no partial state behind.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::auth::Session;
use crate::config::{LlmConfig, StreamingConfig};
use crate::constants::conversation::{DEFAULT_TITLE, TITLE_MAX_CHARS};
use crate::database::ChatStore;
use crate::errors::{AppError, AppResult, ErrorCode, StreamError};
use crate::llm::{system_prompt, GenerationRequest, GenerativeModel, RequestHints, ToolSet};
use crate::logging::StreamLogger;
use crate::models::{Attachment, Conversation, Part, Role, StreamRecord, Turn, Visibility};
use crate::rate_limiting::TurnQuotaPolicy;
use crate::services::reconciler::spawn_reconciliation;
use crate::streaming::{replay_from_last_turn, ReplayOutcome, StreamMultiplexer, Subscription};

/// Inbound message of a chat request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// Client-assigned stable turn ID
    pub id: String,
    /// Must be `user`
    pub role: Role,
    /// Content parts
    pub parts: Vec<Part>,
    /// Attached files
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Body of a create/continue stream request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Conversation ID, caller-supplied on creation
    pub id: String,
    /// The new user turn
    pub message: InboundMessage,
    /// Model selector
    #[serde(default)]
    pub selected_chat_model: Option<String>,
    /// Visibility for a newly created conversation
    #[serde(default)]
    pub selected_visibility_type: Visibility,
}

/// Result of a reattach request
#[derive(Debug)]
pub enum ResumeOutcome {
    /// The latest producer is still attachable
    Live(Subscription),
    /// The producer is gone; replay fallback result
    Replay(ReplayOutcome),
    /// Resumable streams are switched off
    Disabled,
}

/// Coordinates the message log, stream registry, multiplexer and model
pub struct ChatCoordinator {
    store: Arc<dyn ChatStore>,
    multiplexer: Arc<StreamMultiplexer>,
    model: Arc<dyn GenerativeModel>,
    quota: TurnQuotaPolicy,
    streaming: StreamingConfig,
    llm: LlmConfig,
    tools: ToolSet,
}

impl ChatCoordinator {
    /// Create a coordinator
    #[must_use]
    pub fn new(
        store: Arc<dyn ChatStore>,
        multiplexer: Arc<StreamMultiplexer>,
        model: Arc<dyn GenerativeModel>,
        quota: TurnQuotaPolicy,
        streaming: StreamingConfig,
        llm: LlmConfig,
    ) -> Self {
        Self {
            store,
            multiplexer,
            model,
            quota,
            streaming,
            llm,
            tools: ToolSet::new(),
        }
    }

    /// Offer these tools to every generation
    #[must_use]
    pub fn with_tools(mut self, tools: ToolSet) -> Self {
        self.tools = tools;
        self
    }

    /// Persist an inbound turn and start streaming the response
    ///
    /// Business rules:
    /// - The caller's user turns in the trailing quota window must stay below their tier's allowance
    /// - A missing conversation is created with the caller as owner
    /// - An existing conversation must be owned by the caller
    /// - The inbound turn is persisted before the producer starts
    /// - The outbound turn is persisted by a background task after the terminal event
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a malformed request, `QuotaExceeded` when over
    /// quota, `PermissionDenied` for a conversation owned by someone else,
    /// `ResourceAlreadyExists` when the message ID is already taken and store
    /// errors
    pub async fn create_stream(
        &self,
        session: &Session,
        request: ChatRequest,
        hints: &RequestHints,
    ) -> AppResult<Subscription> {
        self.validate(&request)?;
        self.check_quota(session).await?;

        let selected_chat_model = request.selected_chat_model.clone();
        let (conversation, user_turn) = self.persist_inbound(session, request).await?;
        debug!(conversation.id = %conversation.id, turn.id = %user_turn.id, "User turn persisted");

        let history = self.store.get_turns(&conversation.id).await?;

        let record = StreamRecord::generate(&conversation.id);
        self.store.append_stream_record(&record).await?;

        let mut generation =
            GenerationRequest::new(system_prompt(hints), history).with_tools(self.tools.clone());
        if let Some(model) = selected_chat_model {
            generation = generation.with_model(model);
        }

        let model = Arc::clone(&self.model);
        let subscription = self
            .multiplexer
            .start(&record.id, &conversation.id, move || async move {
                model.run(generation).await
            })?;

        spawn_reconciliation(
            Arc::clone(&self.store),
            conversation.id,
            subscription.from_start(),
        );

        Ok(subscription)
    }

    /// Reattach to a conversation's most recent stream
    ///
    /// `from` is the number of events the caller already received.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` when the conversation does not exist or never
    /// had a stream and `PermissionDenied` for a private conversation of
    /// another user
    pub async fn resume_stream(
        &self,
        session: &Session,
        conversation_id: &str,
        from: usize,
    ) -> AppResult<ResumeOutcome> {
        if !self.streaming.resumable_enabled {
            return Ok(ResumeOutcome::Disabled);
        }

        self.readable_conversation(session, conversation_id, "resume")
            .await?;

        match self.multiplexer.resume(conversation_id, from).await {
            Ok(subscription) => Ok(ResumeOutcome::Live(subscription)),
            Err(StreamError::NotLive { .. }) => {
                let last = self.store.last_turn(conversation_id).await?;
                let outcome =
                    replay_from_last_turn(last.as_ref(), Utc::now(), self.streaming.replay_window);
                StreamLogger::log_replay(conversation_id, matches!(outcome, ReplayOutcome::Message(_)));
                Ok(ResumeOutcome::Replay(outcome))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a conversation with its turns and stream records
    ///
    /// A producer still running for the conversation is left to finish; its
    /// reconciliation write is rejected by the store and logged.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` when the conversation does not exist and
    /// `PermissionDenied` when the caller is not the owner
    pub async fn delete_conversation(
        &self,
        session: &Session,
        conversation_id: &str,
    ) -> AppResult<Conversation> {
        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| AppError::not_found("Conversation"))?;

        if !conversation.is_owned_by(&session.user_id) {
            StreamLogger::log_access_denied(&session.user_id, conversation_id, "delete");
            return Err(AppError::permission_denied(
                "Only the owner can delete this conversation",
            ));
        }

        let deleted = self
            .store
            .delete_conversation(conversation_id)
            .await?
            .ok_or_else(|| AppError::not_found("Conversation"))?;
        info!(conversation.id = %conversation_id, "Conversation deleted");
        Ok(deleted)
    }

    /// Persisted turns of a readable conversation
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` or `PermissionDenied` like [`Self::resume_stream`]
    pub async fn list_turns(&self, session: &Session, conversation_id: &str) -> AppResult<Vec<Turn>> {
        self.readable_conversation(session, conversation_id, "read")
            .await?;
        self.store.get_turns(conversation_id).await
    }

    fn validate(&self, request: &ChatRequest) -> AppResult<()> {
        if request.id.trim().is_empty() {
            return Err(AppError::missing_field("id"));
        }
        if request.message.id.trim().is_empty() {
            return Err(AppError::missing_field("message.id"));
        }
        if request.message.role != Role::User {
            return Err(AppError::invalid_input(format!(
                "Inbound message role must be user, got {}",
                request.message.role
            )));
        }
        let has_content = request.message.parts.iter().any(|part| match part {
            Part::Text { text } => !text.trim().is_empty(),
            Part::ToolCall { .. } | Part::ToolResult { .. } => true,
        });
        if !has_content {
            return Err(AppError::invalid_input(
                "Inbound message must contain at least one non-empty part",
            ));
        }
        if let Some(model) = &request.selected_chat_model {
            if !self.llm.is_model_allowed(model) {
                return Err(AppError::invalid_input(format!("Unknown chat model: {model}")));
            }
        }
        Ok(())
    }

    async fn check_quota(&self, session: &Session) -> AppResult<()> {
        let since = self.quota.window_start(Utc::now());
        let used = self
            .store
            .count_user_turns_since(&session.user_id, since)
            .await?;
        let info = self.quota.evaluate(session.tier, used);

        match info.limit {
            Some(limit) if info.is_rate_limited => {
                StreamLogger::log_quota_rejected(&session.user_id, session.tier.as_str(), used, limit);
                Err(AppError::quota_exceeded(limit, info.window_hours))
            }
            _ => Ok(()),
        }
    }

    /// Store the inbound turn, creating the conversation with it when it is new
    async fn persist_inbound(
        &self,
        session: &Session,
        request: ChatRequest,
    ) -> AppResult<(Conversation, Turn)> {
        let user_turn = Turn {
            id: request.message.id,
            conversation_id: request.id.clone(),
            role: Role::User,
            parts: request.message.parts,
            attachments: request.message.attachments,
            created_at: Utc::now(),
        };

        if let Some(existing) = self.store.get_conversation(&request.id).await? {
            let conversation = Self::owned_by_caller(session, existing)?;
            self.store.append_turns(std::slice::from_ref(&user_turn)).await?;
            return Ok((conversation, user_turn));
        }

        let conversation = Conversation {
            id: request.id,
            owner_id: session.user_id.clone(),
            title: derive_title(&user_turn.parts),
            visibility: request.selected_visibility_type,
            created_at: user_turn.created_at,
        };

        match self
            .store
            .create_conversation_with_turn(&conversation, &user_turn)
            .await
        {
            Ok(()) => {
                info!(conversation.id = %conversation.id, "Conversation created");
                Ok((conversation, user_turn))
            }
            // Either the turn id is taken or another request created the conversation first
            Err(e) if e.code == ErrorCode::ResourceAlreadyExists => {
                let Some(existing) = self.store.get_conversation(&conversation.id).await? else {
                    return Err(e);
                };
                let conversation = Self::owned_by_caller(session, existing)?;
                self.store.append_turns(std::slice::from_ref(&user_turn)).await?;
                Ok((conversation, user_turn))
            }
            Err(e) => Err(e),
        }
    }

    fn owned_by_caller(session: &Session, conversation: Conversation) -> AppResult<Conversation> {
        if conversation.is_owned_by(&session.user_id) {
            Ok(conversation)
        } else {
            StreamLogger::log_access_denied(&session.user_id, &conversation.id, "write");
            Err(AppError::permission_denied(
                "Conversation belongs to another user",
            ))
        }
    }

    async fn readable_conversation(
        &self,
        session: &Session,
        conversation_id: &str,
        action: &str,
    ) -> AppResult<Conversation> {
        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| AppError::not_found("Conversation"))?;

        if conversation.is_visible_to(&session.user_id) {
            Ok(conversation)
        } else {
            StreamLogger::log_access_denied(&session.user_id, conversation_id, action);
            Err(AppError::permission_denied("Conversation is private"))
        }
    }
}

/// Title for a new conversation from its first inbound turn
///
/// Uses the first non-blank text part with whitespace collapsed, cut to
/// 80 characters.
#[must_use]
pub fn derive_title(parts: &[Part]) -> String {
    parts
        .iter()
        .filter_map(Part::as_text)
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .find(|text| !text.is_empty())
        .map_or_else(
            || DEFAULT_TITLE.to_owned(),
            |text| text.chars().take(TITLE_MAX_CHARS).collect(),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_title_collapses_whitespace() {
        let parts = vec![Part::text("  What   is\n the weather? ")];
        assert_eq!(derive_title(&parts), "What is the weather?");
    }

    #[test]
    fn test_title_truncates_on_char_boundary() {
        let long = "é".repeat(200);
        let title = derive_title(&[Part::text(long)]);
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS);
    }

    #[test]
    fn test_title_defaults_without_text() {
        let parts = vec![
            Part::text("   "),
            Part::ToolResult {
                tool_call_id: "1".to_owned(),
                tool_name: "t".to_owned(),
                result: json!(null),
            },
        ];
        assert_eq!(derive_title(&parts), DEFAULT_TITLE);
    }

    #[test]
    fn test_request_body_shape() {
        let request: ChatRequest = serde_json::from_value(json!({
            "id": "c1",
            "message": {
                "id": "m1",
                "role": "user",
                "parts": [{"type": "text", "text": "hi"}]
            },
            "selectedChatModel": "small",
            "selectedVisibilityType": "public"
        }))
        .unwrap();
        assert_eq!(request.selected_visibility_type, Visibility::Public);
        assert_eq!(request.selected_chat_model.as_deref(), Some("small"));
        assert!(request.message.attachments.is_empty());
    }
}
