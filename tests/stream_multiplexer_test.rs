// ABOUTME: Integration tests for the stream multiplexer
// ABOUTME: Tests gap-free resumption, producer independence from clients, conflicts and eviction
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::create_test_database;
use futures_util::StreamExt;
use threadline_server::{
    config::StreamingConfig,
    database::ChatStore,
    errors::{AppResult, StreamError},
    llm::{GenerativeModel, GenerationRequest, ModelEvent, ModelEventStream, ScriptedModel},
    models::{Conversation, StreamRecord, Visibility},
    streaming::{StreamEvent, StreamMultiplexer},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

// ============================================================================
// Test Helpers
// ============================================================================

async fn store_with_stream(conversation_id: &str) -> (Arc<dyn ChatStore>, StreamRecord) {
    let store: Arc<dyn ChatStore> = create_test_database().await.unwrap();
    store
        .create_conversation(&Conversation {
            id: conversation_id.to_owned(),
            owner_id: "alice".to_owned(),
            title: "test".to_owned(),
            visibility: Visibility::Private,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    let record = StreamRecord::generate(conversation_id);
    store.append_stream_record(&record).await.unwrap();
    (store, record)
}

/// Producer fed by the test through a channel
fn channel_producer() -> (
    mpsc::Sender<AppResult<ModelEvent>>,
    impl FnOnce() -> std::future::Ready<AppResult<ModelEventStream>> + Send + 'static,
) {
    let (tx, rx) = mpsc::channel(16);
    let factory = move || {
        let events: ModelEventStream = Box::pin(ReceiverStream::new(rx));
        std::future::ready(Ok(events))
    };
    (tx, factory)
}

fn scripted(model: ScriptedModel) -> impl FnOnce() -> futures_util::future::BoxFuture<'static, AppResult<ModelEventStream>> + Send + 'static {
    move || Box::pin(async move { model.run(GenerationRequest::new("sys", Vec::new())).await })
}

fn delta(event: &StreamEvent) -> Option<&str> {
    match event {
        StreamEvent::TextDelta { delta } => Some(delta),
        _ => None,
    }
}

// ============================================================================
// Resumption
// ============================================================================

#[tokio::test]
async fn test_resume_mid_stream_has_no_gap_or_duplicate() {
    let (store, record) = store_with_stream("c1").await;
    let multiplexer = StreamMultiplexer::new(store, StreamingConfig::default());
    let (tx, factory) = channel_producer();

    let mut first = multiplexer.start(&record.id, "c1", factory).unwrap();
    let observer = first.from_start();

    for word in ["a", "b", "c"] {
        tx.send(Ok(ModelEvent::text(word))).await.unwrap();
    }
    let mut delivered = Vec::new();
    for _ in 0..3 {
        delivered.push(first.next().await.unwrap());
    }
    drop(first);

    let resumed = multiplexer.resume("c1", delivered.len()).await.unwrap();
    for word in ["d", "e"] {
        tx.send(Ok(ModelEvent::text(word))).await.unwrap();
    }
    tx.send(Ok(ModelEvent::finish())).await.unwrap();

    delivered.extend(resumed.collect::<Vec<_>>().await);
    let full: Vec<StreamEvent> = observer.collect().await;

    assert_eq!(delivered, full);
    let text: String = full.iter().filter_map(delta).collect();
    assert_eq!(text, "abcde");
    assert!(full.last().unwrap().is_terminal());
}

#[tokio::test]
async fn test_subscribers_see_identical_order() {
    let (store, record) = store_with_stream("c1").await;
    let multiplexer = StreamMultiplexer::new(store, StreamingConfig::default());
    let model = ScriptedModel::text(["x", "y", "z"]).with_delay(Duration::from_millis(5));

    let first = multiplexer.start(&record.id, "c1", scripted(model)).unwrap();
    let second = multiplexer.attach(&record.id, 0).unwrap();

    let (a, b) = tokio::join!(first.collect::<Vec<_>>(), second.collect::<Vec<_>>());
    assert_eq!(a, b);
    assert_eq!(a.len(), 4);
}

#[tokio::test]
async fn test_dropping_subscribers_does_not_stop_producer() {
    let (store, record) = store_with_stream("c1").await;
    let multiplexer = StreamMultiplexer::new(store, StreamingConfig::default());
    let model = ScriptedModel::text(["slow ", "answer"]).with_delay(Duration::from_millis(20));

    let subscription = multiplexer.start(&record.id, "c1", scripted(model)).unwrap();
    drop(subscription);

    let late = multiplexer.resume("c1", 0).await.unwrap();
    let events: Vec<StreamEvent> = late.collect().await;
    let text: String = events.iter().filter_map(delta).collect();
    assert_eq!(text, "slow answer");
}

#[tokio::test]
async fn test_resume_reports_missing_and_gone_streams() {
    let (store, record) = store_with_stream("c1").await;
    let multiplexer = StreamMultiplexer::new(Arc::clone(&store), StreamingConfig::default());

    let err = multiplexer.resume("c1", 0).await.unwrap_err();
    assert_eq!(
        err,
        StreamError::NotLive {
            stream_id: record.id.clone()
        }
    );

    let err = multiplexer.resume("never-streamed", 0).await.unwrap_err();
    assert!(matches!(err, StreamError::NoStreamRecord { .. }));
}

#[tokio::test]
async fn test_resume_targets_latest_stream_record() {
    let (store, old) = store_with_stream("c1").await;
    let multiplexer = StreamMultiplexer::new(Arc::clone(&store), StreamingConfig::default());
    let (_old_tx, old_factory) = channel_producer();
    let _old_sub = multiplexer.start(&old.id, "c1", old_factory).unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let newest = StreamRecord::generate("c1");
    store.append_stream_record(&newest).await.unwrap();
    let (_new_tx, new_factory) = channel_producer();
    let _new_sub = multiplexer.start(&newest.id, "c1", new_factory).unwrap();

    let resumed = multiplexer.resume("c1", 0).await.unwrap();
    assert_eq!(resumed.stream_id(), newest.id);
}

// ============================================================================
// Producer Outcomes
// ============================================================================

#[tokio::test]
async fn test_duplicate_stream_id_conflicts() {
    let (store, record) = store_with_stream("c1").await;
    let multiplexer = StreamMultiplexer::new(store, StreamingConfig::default());
    let (_tx, factory) = channel_producer();
    let _running = multiplexer.start(&record.id, "c1", factory).unwrap();

    let (_tx2, factory2) = channel_producer();
    let err = multiplexer.start(&record.id, "c1", factory2).unwrap_err();
    assert!(matches!(err, StreamError::Conflict { .. }));
    assert_eq!(multiplexer.live_streams(), 1);
}

#[tokio::test]
async fn test_mid_stream_error_terminates_with_error_event() {
    let (store, record) = store_with_stream("c1").await;
    let multiplexer = StreamMultiplexer::new(store, StreamingConfig::default());
    let model = ScriptedModel::new(vec![ModelEvent::text("half")]).failing_with("connection reset");

    let events: Vec<StreamEvent> = multiplexer
        .start(&record.id, "c1", scripted(model))
        .unwrap()
        .collect()
        .await;

    assert_eq!(events.len(), 2);
    assert!(matches!(events[1], StreamEvent::Error { .. }));
}

#[tokio::test]
async fn test_silent_end_gets_finish_event() {
    let (store, record) = store_with_stream("c1").await;
    let multiplexer = StreamMultiplexer::new(store, StreamingConfig::default());
    let model = ScriptedModel::new(vec![ModelEvent::text("no terminal")]);

    let events: Vec<StreamEvent> = multiplexer
        .start(&record.id, "c1", scripted(model))
        .unwrap()
        .collect()
        .await;

    assert_eq!(
        events.last(),
        Some(&StreamEvent::Finish {
            finish_reason: None
        })
    );
}

#[tokio::test]
async fn test_producer_timeout_publishes_error() {
    let (store, record) = store_with_stream("c1").await;
    let config = StreamingConfig {
        producer_timeout: Duration::from_millis(50),
        ..StreamingConfig::default()
    };
    let multiplexer = StreamMultiplexer::new(store, config);
    let (_tx, factory) = channel_producer();

    let events: Vec<StreamEvent> = multiplexer
        .start(&record.id, "c1", factory)
        .unwrap()
        .collect()
        .await;

    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], StreamEvent::Error { .. }));
}

#[tokio::test]
async fn test_panicking_producer_publishes_error_and_is_evicted() {
    let (store, record) = store_with_stream("c1").await;
    let config = StreamingConfig {
        grace_period: Duration::ZERO,
        ..StreamingConfig::default()
    };
    let multiplexer = StreamMultiplexer::new(store, config);
    let factory = || async {
        let events: ModelEventStream = Box::pin(futures_util::stream::iter(0..2).map(|i| -> AppResult<ModelEvent> {
            assert!(i == 0, "producer bug");
            Ok(ModelEvent::text("partial"))
        }));
        AppResult::Ok(events)
    };

    let events: Vec<StreamEvent> = multiplexer
        .start(&record.id, "c1", factory)
        .unwrap()
        .collect()
        .await;

    assert_eq!(events.len(), 2);
    assert_eq!(delta(&events[0]), Some("partial"));
    assert!(matches!(events[1], StreamEvent::Error { .. }));

    for _ in 0..100 {
        if multiplexer.live_streams() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(multiplexer.live_streams(), 0);
}

// ============================================================================
// Grace Period
// ============================================================================

#[tokio::test]
async fn test_finished_handle_is_evicted_after_grace_period() {
    let (store, record) = store_with_stream("c1").await;
    let config = StreamingConfig {
        grace_period: Duration::from_secs(5),
        ..StreamingConfig::default()
    };
    let multiplexer = StreamMultiplexer::new(store, config);

    tokio::time::pause();
    let events: Vec<StreamEvent> = multiplexer
        .start(&record.id, "c1", scripted(ScriptedModel::text(["done"])))
        .unwrap()
        .collect()
        .await;
    assert_eq!(events.len(), 2);
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    tokio::time::advance(Duration::from_secs(4)).await;
    tokio::task::yield_now().await;
    assert_eq!(multiplexer.live_streams(), 1);
    let replayed: Vec<StreamEvent> = multiplexer.attach(&record.id, 0).unwrap().collect().await;
    assert_eq!(replayed, events);

    tokio::time::advance(Duration::from_secs(2)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(multiplexer.live_streams(), 0);
    assert!(multiplexer.attach(&record.id, 0).is_none());
}
