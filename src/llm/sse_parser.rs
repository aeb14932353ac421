// ABOUTME: Line-buffering parser for Server-Sent Events emitted by model backends
// ABOUTME: Handles partial lines across TCP boundaries and multiple events per chunk
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # SSE Stream Parser
//!
//! Network chunks do not line up with SSE event boundaries: one chunk may carry
//! several events, and a JSON payload may be split across two chunks. The
//! [`SseLineBuffer`] accumulates bytes until complete lines are available, and
//! [`create_sse_stream`] drives a backend-specific handler over the parsed
//! events.

use std::collections::VecDeque;
use std::mem;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::stream::unfold;
use futures_util::{Stream, StreamExt};

use super::{ModelEvent, ModelEventStream};
use crate::constants::streaming::DONE_SENTINEL;
use crate::errors::{AppError, AppResult};

/// A parsed SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A `data:` payload with the prefix stripped
    Data(String),
    /// The `[DONE]` termination signal
    Done,
}

/// Line-buffering SSE parser
///
/// Chunks are kept as raw bytes so a UTF-8 sequence split across two network
/// reads is only decoded once its line is complete.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    /// Bytes not yet terminated by a newline
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    /// Create a new empty line buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a network chunk, returning every complete event it finished
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            if let Some(event) = parse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Parse whatever is left once the byte stream ends
    pub fn flush(&mut self) -> Option<SseEvent> {
        let remaining = mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&remaining))
    }
}

/// Parse one SSE line; non-data fields (`event:`, `id:`, comments) are ignored
fn parse_line(line: &str) -> Option<SseEvent> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data.is_empty() {
        None
    } else if data == DONE_SENTINEL {
        Some(SseEvent::Done)
    } else {
        Some(SseEvent::Data(data.to_owned()))
    }
}

/// State carried across iterations of the unfold
struct SseStreamState<F> {
    bytes: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    parser: SseLineBuffer,
    pending: VecDeque<AppResult<ModelEvent>>,
    handler: F,
    provider_name: &'static str,
    ended: bool,
}

impl<F> SseStreamState<F>
where
    F: FnMut(SseEvent) -> Vec<AppResult<ModelEvent>>,
{
    fn dispatch(&mut self, event: SseEvent) {
        self.pending.extend((self.handler)(event));
    }
}

/// Turn a raw response byte stream into model events
///
/// `handler` receives each SSE event and may return any number of model
/// events; it owns whatever state is needed to assemble events that span
/// several chunks (streamed tool call arguments, for instance).
pub fn create_sse_stream<S, F>(byte_stream: S, handler: F, provider_name: &'static str) -> ModelEventStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    F: FnMut(SseEvent) -> Vec<AppResult<ModelEvent>> + Send + 'static,
{
    let state = SseStreamState {
        bytes: Box::pin(byte_stream),
        parser: SseLineBuffer::new(),
        pending: VecDeque::new(),
        handler,
        provider_name,
        ended: false,
    };

    let stream = unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.ended {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(bytes)) => {
                    for event in state.parser.feed(&bytes) {
                        state.dispatch(event);
                    }
                }
                Some(Err(e)) => {
                    state.ended = true;
                    let error =
                        AppError::external_service(state.provider_name, format!("Stream read error: {e}"));
                    return Some((Err(error), state));
                }
                None => {
                    state.ended = true;
                    if let Some(event) = state.parser.flush() {
                        state.dispatch(event);
                    }
                }
            }
        }
    });

    Box::pin(stream)
}
