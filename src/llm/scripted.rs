// ABOUTME: Deterministic scripted model backend used by tests and local demos
// ABOUTME: Replays a fixed event list, echoes the last user turn, or fails on cue
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;

use super::{GenerationRequest, GenerativeModel, ModelEvent, ModelEventStream};
use crate::errors::{AppError, AppResult};
use crate::models::Role;

#[derive(Debug, Clone)]
enum Script {
    /// Emit these events verbatim
    Fixed(Vec<ModelEvent>),
    /// Echo the newest user turn word by word
    Echo,
}

/// Model backend that produces a predetermined event sequence
#[derive(Debug, Clone)]
pub struct ScriptedModel {
    script: Script,
    delay: Option<Duration>,
    fail_with: Option<String>,
    refuse_with: Option<String>,
}

impl ScriptedModel {
    /// Replay `events` exactly; no terminal event is added
    #[must_use]
    pub const fn new(events: Vec<ModelEvent>) -> Self {
        Self {
            script: Script::Fixed(events),
            delay: None,
            fail_with: None,
            refuse_with: None,
        }
    }

    /// Text deltas followed by a normal finish
    #[must_use]
    pub fn text<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut events: Vec<ModelEvent> = deltas.into_iter().map(ModelEvent::text).collect();
        events.push(ModelEvent::finish());
        Self::new(events)
    }

    /// Echo the newest user turn back, one word per event
    #[must_use]
    pub const fn echo() -> Self {
        Self {
            script: Script::Echo,
            delay: None,
            fail_with: None,
            refuse_with: None,
        }
    }

    /// Sleep before each event
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Yield an error after the scripted events
    #[must_use]
    pub fn failing_with(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    /// Reject the request before producing anything
    #[must_use]
    pub fn refusing_with(mut self, message: impl Into<String>) -> Self {
        self.refuse_with = Some(message.into());
        self
    }

    fn events_for(&self, request: &GenerationRequest) -> Vec<ModelEvent> {
        match &self.script {
            Script::Fixed(events) => events.clone(),
            Script::Echo => {
                let text = request
                    .turns
                    .iter()
                    .rev()
                    .find(|turn| turn.role == Role::User)
                    .map(|turn| turn.text())
                    .unwrap_or_default();
                let mut events: Vec<ModelEvent> = text
                    .split_inclusive(' ')
                    .map(ModelEvent::text)
                    .collect();
                events.push(ModelEvent::finish());
                events
            }
        }
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn run(&self, request: GenerationRequest) -> AppResult<ModelEventStream> {
        if let Some(message) = &self.refuse_with {
            return Err(AppError::external_service("scripted", message.clone()));
        }

        let events = self.events_for(&request);
        let delay = self.delay;
        let fail_with = self.fail_with.clone();

        Ok(Box::pin(stream! {
            for event in events {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(event);
            }
            if let Some(message) = fail_with {
                yield Err(AppError::external_service("scripted", message));
            }
        }))
    }
}
