// ABOUTME: Chat route handlers for resumable streaming conversations
// ABOUTME: Provides endpoints to start, reattach to and delete streams and to read persisted turns
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Chat routes
//!
//! Streams are sent as server-sent events: one `data:` line per event, then
//! a `[DONE]` trailer after the terminal event. Every failure detected before
//! the first event is a plain JSON error response; failures after that point
//! arrive as an `error` event inside a `200` stream.

use std::convert::Infallible;
use std::sync::Arc;

use async_stream::stream;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{Stream, StreamExt};
use serde::Deserialize;
use tracing::{info, warn};

use crate::auth::Session;
use crate::constants::streaming::DONE_SENTINEL;
use crate::errors::AppError;
use crate::llm::RequestHints;
use crate::resources::ServerResources;
use crate::services::{ChatRequest, ResumeOutcome};
use crate::streaming::StreamEvent;

/// Query of a reattach request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResumeQuery {
    chat_id: Option<String>,
    /// Number of events the client already holds
    from: Option<String>,
}

/// Query of a delete request
#[derive(Debug, Deserialize)]
struct DeleteQuery {
    id: Option<String>,
}

/// Chat routes handler
pub struct ChatRoutes;

impl ChatRoutes {
    /// Create all chat routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route(
                "/api/chat",
                post(Self::create_stream).delete(Self::delete_conversation),
            )
            .route("/api/chat/stream", get(Self::resume_stream))
            .route("/api/chat/:conversation_id/messages", get(Self::get_messages))
            .with_state(resources)
    }

    /// Resolve the caller's session from the authorization header or cookie
    fn authenticate(headers: &HeaderMap, resources: &ServerResources) -> Result<Session, AppError> {
        resources
            .auth_manager
            .current_session(headers)
            .ok_or_else(AppError::auth_required)
    }

    /// Persist the inbound turn and stream the response
    async fn create_stream(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
        let request: ChatRequest = serde_json::from_slice(&body)
            .map_err(|e| AppError::invalid_input(format!("Invalid request body: {e}")))?;
        let session = Self::authenticate(&headers, &resources)?;
        let hints = RequestHints::from_headers(&headers);

        let subscription = resources
            .coordinator
            .create_stream(&session, request, &hints)
            .await?;
        info!(
            user.id = %session.user_id,
            stream.id = %subscription.stream_id(),
            "Chat stream opened"
        );

        Ok(Sse::new(sse_events(subscription)).keep_alive(KeepAlive::default()))
    }

    /// Reattach to the conversation's most recent stream
    async fn resume_stream(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Query(query): Query<ResumeQuery>,
    ) -> Result<Response, AppError> {
        let conversation_id = query
            .chat_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::missing_field("chatId"))?;
        let from = match query.from.as_deref() {
            None | Some("") => 0,
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| AppError::invalid_input(format!("Invalid from offset: {raw}")))?,
        };
        let session = Self::authenticate(&headers, &resources)?;

        let outcome = resources
            .coordinator
            .resume_stream(&session, &conversation_id, from)
            .await?;

        let response = match outcome {
            ResumeOutcome::Disabled => StatusCode::NO_CONTENT.into_response(),
            ResumeOutcome::Live(subscription) => Sse::new(sse_events(subscription))
                .keep_alive(KeepAlive::default())
                .into_response(),
            ResumeOutcome::Replay(replay) => {
                let events = replay.into_events();
                if events.is_empty() {
                    StatusCode::OK.into_response()
                } else {
                    Sse::new(sse_events(futures_util::stream::iter(events))).into_response()
                }
            }
        };
        Ok(response)
    }

    /// Delete a conversation the caller owns
    async fn delete_conversation(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Query(query): Query<DeleteQuery>,
    ) -> Result<Response, AppError> {
        let conversation_id = query
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::missing_field("id"))?;
        let session = Self::authenticate(&headers, &resources)?;

        let deleted = resources
            .coordinator
            .delete_conversation(&session, &conversation_id)
            .await?;

        Ok((StatusCode::OK, Json(deleted)).into_response())
    }

    /// Persisted turns of a readable conversation
    async fn get_messages(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Path(conversation_id): Path<String>,
    ) -> Result<Response, AppError> {
        let session = Self::authenticate(&headers, &resources)?;
        let turns = resources
            .coordinator
            .list_turns(&session, &conversation_id)
            .await?;

        Ok((StatusCode::OK, Json(turns)).into_response())
    }
}

/// Render stream events as SSE `data:` frames followed by the `[DONE]` trailer
fn sse_events<S>(events: S) -> impl Stream<Item = Result<Event, Infallible>> + Send
where
    S: Stream<Item = StreamEvent> + Send + 'static,
{
    stream! {
        let mut events = Box::pin(events);
        while let Some(event) = events.next().await {
            match event.to_sse_data() {
                Ok(data) => yield Ok(Event::default().data(data)),
                Err(e) => warn!("Dropping unserializable stream event: {e}"),
            }
        }
        yield Ok(Event::default().data(DONE_SENTINEL));
    }
}
