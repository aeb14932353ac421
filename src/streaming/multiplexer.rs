// ABOUTME: Stream multiplexer running producers independently of the requests that start them
// ABOUTME: Buffers every event per stream so late subscribers resume without gaps or duplicates
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Stream Multiplexer
//!
//! Each producer run is bound to one stream identifier and owned by a
//! [`ProducerHandle`] kept in an arena keyed by that identifier. The producer
//! task is the only writer: it appends events to the handle's buffer and bumps
//! a `watch` progress value. Subscribers read the buffer from their own cursor
//! and wait on the progress channel, so every subscriber sees the same order
//! and a subscriber that starts at offset `n` sees exactly the events after the
//! first `n`.
//!
//! Producers run on their own task. Dropping a [`Subscription`] (a client
//! disconnect) never stops the producer. Once a producer reaches its terminal
//! event the handle stays attachable for a grace period, then leaves the
//! arena.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_stream::stream;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::{Stream, StreamExt};
use tokio::sync::{watch, RwLock};
use tokio::time::{sleep, timeout};
use tracing::{error, warn};

use super::events::StreamEvent;
use crate::config::StreamingConfig;
use crate::database::ChatStore;
use crate::errors::{AppResult, StreamError};
use crate::llm::ModelEventStream;
use crate::logging::StreamLogger;

/// Producer progress observed by subscribers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Progress {
    /// Number of events in the buffer
    published: usize,
    /// Terminal event published or producer gone
    finished: bool,
}

/// In-memory state of one producer run
pub struct ProducerHandle {
    stream_id: String,
    conversation_id: String,
    events: RwLock<Vec<StreamEvent>>,
    progress: watch::Sender<Progress>,
}

impl ProducerHandle {
    fn new(stream_id: &str, conversation_id: &str) -> Self {
        let (progress, _) = watch::channel(Progress::default());
        Self {
            stream_id: stream_id.to_owned(),
            conversation_id: conversation_id.to_owned(),
            events: RwLock::new(Vec::new()),
            progress,
        }
    }

    /// Stream identifier this handle serves
    #[must_use]
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Conversation the stream belongs to
    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Whether the producer has reached its terminal event
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.progress.borrow().finished
    }

    async fn publish(&self, event: StreamEvent) {
        let published = {
            let mut events = self.events.write().await;
            events.push(event);
            events.len()
        };
        self.progress.send_modify(|p| p.published = published);
    }

    fn mark_finished(&self) {
        self.progress.send_modify(|p| p.finished = true);
    }

    async fn events_from(&self, cursor: usize) -> Vec<StreamEvent> {
        self.events
            .read()
            .await
            .get(cursor..)
            .map(<[StreamEvent]>::to_vec)
            .unwrap_or_default()
    }
}

/// Live view of a producer's events starting at a fixed offset
pub struct Subscription {
    handle: Arc<ProducerHandle>,
    inner: Pin<Box<dyn Stream<Item = StreamEvent> + Send>>,
}

impl Subscription {
    fn new(handle: Arc<ProducerHandle>, from: usize) -> Self {
        let reader = Arc::clone(&handle);
        let inner = stream! {
            let mut progress = reader.progress.subscribe();
            let mut cursor = from;
            loop {
                let seen = *progress.borrow_and_update();
                let batch = reader.events_from(cursor).await;
                cursor += batch.len();
                for event in batch {
                    yield event;
                }
                if seen.finished && cursor >= seen.published {
                    break;
                }
                if progress.changed().await.is_err() {
                    for event in reader.events_from(cursor).await {
                        yield event;
                    }
                    break;
                }
            }
        };
        Self {
            handle,
            inner: Box::pin(inner),
        }
    }

    /// Stream identifier being observed
    #[must_use]
    pub fn stream_id(&self) -> &str {
        self.handle.stream_id()
    }

    /// A second, independent subscription to the same producer from offset 0
    #[must_use]
    pub fn from_start(&self) -> Self {
        Self::new(Arc::clone(&self.handle), 0)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("stream_id", &self.handle.stream_id)
            .field("finished", &self.handle.is_finished())
            .finish_non_exhaustive()
    }
}

impl Stream for Subscription {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// Registry of live producer handles keyed by stream identifier
pub struct StreamMultiplexer {
    handles: Arc<DashMap<String, Arc<ProducerHandle>>>,
    store: Arc<dyn ChatStore>,
    config: StreamingConfig,
}

impl StreamMultiplexer {
    /// Create an empty multiplexer reading stream records from `store`
    #[must_use]
    pub fn new(store: Arc<dyn ChatStore>, config: StreamingConfig) -> Self {
        Self {
            handles: Arc::new(DashMap::new()),
            store,
            config,
        }
    }

    /// Run a producer under `stream_id` and subscribe to it from the first event
    ///
    /// The factory runs on its own producer task. A factory error, a stream
    /// error, the producer timeout or a panicking producer each become a
    /// terminal `error` event. A stream that ends without a terminal event gets
    /// a `finish` event appended.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Conflict`] if `stream_id` already has a handle
    pub fn start<F, Fut>(
        &self,
        stream_id: &str,
        conversation_id: &str,
        factory: F,
    ) -> Result<Subscription, StreamError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = AppResult<ModelEventStream>> + Send + 'static,
    {
        let handle = Arc::new(ProducerHandle::new(stream_id, conversation_id));
        match self.handles.entry(stream_id.to_owned()) {
            Entry::Occupied(_) => {
                return Err(StreamError::Conflict {
                    stream_id: stream_id.to_owned(),
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&handle));
            }
        }

        StreamLogger::log_stream_started(stream_id, conversation_id);
        let subscription = Subscription::new(Arc::clone(&handle), 0);

        let handles = Arc::clone(&self.handles);
        let config = self.config;
        tokio::spawn(async move {
            let producer = tokio::spawn({
                let handle = Arc::clone(&handle);
                async move { timeout(config.producer_timeout, drive(&handle, factory)).await }
            });
            let failed = match producer.await {
                Ok(Ok(failed)) => failed,
                Ok(Err(_)) => {
                    warn!(stream.id = %handle.stream_id, "Producer timed out");
                    handle
                        .publish(StreamEvent::error("The response took too long and was stopped"))
                        .await;
                    true
                }
                Err(e) => {
                    error!(stream.id = %handle.stream_id, "Producer task aborted: {e}");
                    handle
                        .publish(StreamEvent::error("The response stopped unexpectedly"))
                        .await;
                    true
                }
            };
            handle.mark_finished();

            let published = handle.progress.borrow().published;
            StreamLogger::log_stream_finished(&handle.stream_id, published, failed);

            sleep(config.grace_period).await;
            if handles
                .remove_if(&handle.stream_id, |_, current| Arc::ptr_eq(current, &handle))
                .is_some()
            {
                StreamLogger::log_stream_evicted(&handle.stream_id);
            }
        });

        Ok(subscription)
    }

    /// Subscribe to a live handle from offset `from`
    #[must_use]
    pub fn attach(&self, stream_id: &str, from: usize) -> Option<Subscription> {
        let handle = self.handles.get(stream_id).map(|entry| Arc::clone(entry.value()))?;
        Some(Subscription::new(handle, from))
    }

    /// Reattach to the most recent stream of a conversation
    ///
    /// `from` is the number of events the caller already holds; the
    /// subscription yields everything after them.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::NoStreamRecord`] when the conversation never had a
    /// stream, [`StreamError::NotLive`] when its latest stream has no handle and
    /// [`StreamError::Registry`] when the registry cannot be read
    pub async fn resume(
        &self,
        conversation_id: &str,
        from: usize,
    ) -> Result<Subscription, StreamError> {
        let ids = self
            .store
            .list_stream_record_ids(conversation_id)
            .await
            .map_err(|e| StreamError::Registry {
                message: e.to_string(),
            })?;
        let latest = ids.last().ok_or_else(|| StreamError::NoStreamRecord {
            conversation_id: conversation_id.to_owned(),
        })?;

        let subscription = self.attach(latest, from).ok_or_else(|| StreamError::NotLive {
            stream_id: latest.clone(),
        })?;
        StreamLogger::log_stream_resumed(latest, conversation_id, from);
        Ok(subscription)
    }

    /// Number of handles currently held, including finished ones in their grace period
    #[must_use]
    pub fn live_streams(&self) -> usize {
        self.handles.len()
    }
}

/// Drive the producer to its terminal event; returns whether it failed
async fn drive<F, Fut>(handle: &ProducerHandle, factory: F) -> bool
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = AppResult<ModelEventStream>>,
{
    let mut events = match factory().await {
        Ok(events) => events,
        Err(e) => {
            warn!(stream.id = %handle.stream_id, "Producer failed to start: {e}");
            handle.publish(StreamEvent::error(e.message)).await;
            return true;
        }
    };

    while let Some(item) = events.next().await {
        match item {
            Ok(event) => {
                let event = StreamEvent::from(event);
                let terminal = event.is_terminal();
                handle.publish(event).await;
                if terminal {
                    return false;
                }
            }
            Err(e) => {
                warn!(stream.id = %handle.stream_id, "Producer failed mid-stream: {e}");
                handle.publish(StreamEvent::error(e.message)).await;
                return true;
            }
        }
    }

    handle
        .publish(StreamEvent::Finish {
            finish_reason: None,
        })
        .await;
    false
}
