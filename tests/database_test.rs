// ABOUTME: Integration tests for the SQLite message log and stream registry
// ABOUTME: Tests ordering, cascading deletes, quota counting and file-backed persistence
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use chrono::{DateTime, Duration, Utc};
use common::create_test_database;
use serde_json::json;
use threadline_server::{
    config::DatabaseUrl,
    database::{ChatStore, Database},
    errors::ErrorCode,
    models::{Attachment, Conversation, Part, Role, StreamRecord, Turn, Visibility},
};

// ============================================================================
// Test Helpers
// ============================================================================

fn conversation(id: &str, owner: &str) -> Conversation {
    Conversation {
        id: id.to_owned(),
        owner_id: owner.to_owned(),
        title: "Test".to_owned(),
        visibility: Visibility::Private,
        created_at: Utc::now(),
    }
}

fn turn(id: &str, conversation_id: &str, role: Role, created_at: DateTime<Utc>) -> Turn {
    Turn {
        id: id.to_owned(),
        conversation_id: conversation_id.to_owned(),
        role,
        parts: vec![Part::text(format!("turn {id}"))],
        attachments: Vec::new(),
        created_at,
    }
}

// ============================================================================
// Conversations
// ============================================================================

#[tokio::test]
async fn test_conversation_round_trip() {
    let db = create_test_database().await.unwrap();
    let mut conv = conversation("c1", "alice");
    conv.visibility = Visibility::Public;
    db.create_conversation(&conv).await.unwrap();

    let loaded = db.get_conversation("c1").await.unwrap().unwrap();
    assert_eq!(loaded.owner_id, "alice");
    assert_eq!(loaded.visibility, Visibility::Public);
    assert!(db.get_conversation("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_conversation_conflicts() {
    let db = create_test_database().await.unwrap();
    db.create_conversation(&conversation("c1", "alice")).await.unwrap();

    let err = db
        .create_conversation(&conversation("c1", "bob"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceAlreadyExists);
}

#[tokio::test]
async fn test_delete_cascades_turns_and_stream_records() {
    let db = create_test_database().await.unwrap();
    db.create_conversation(&conversation("c1", "alice")).await.unwrap();
    db.append_turns(&[turn("t1", "c1", Role::User, Utc::now())])
        .await
        .unwrap();
    db.append_stream_record(&StreamRecord::generate("c1"))
        .await
        .unwrap();

    let deleted = db.delete_conversation("c1").await.unwrap().unwrap();
    assert_eq!(deleted.id, "c1");

    assert!(db.get_conversation("c1").await.unwrap().is_none());
    assert!(db.get_turns("c1").await.unwrap().is_empty());
    assert!(db.list_stream_record_ids("c1").await.unwrap().is_empty());
    assert!(db.delete_conversation("c1").await.unwrap().is_none());
}

// ============================================================================
// Turns
// ============================================================================

#[tokio::test]
async fn test_turns_are_ordered_by_creation() {
    let db = create_test_database().await.unwrap();
    db.create_conversation(&conversation("c1", "alice")).await.unwrap();
    let base = Utc::now();

    db.append_turns(&[
        turn("late", "c1", Role::Assistant, base + Duration::seconds(2)),
        turn("early", "c1", Role::User, base),
    ])
    .await
    .unwrap();
    db.append_turns(&[turn("middle", "c1", Role::User, base + Duration::seconds(1))])
        .await
        .unwrap();

    let ids: Vec<String> = db
        .get_turns("c1")
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(ids, vec!["early", "middle", "late"]);

    let last = db.last_turn("c1").await.unwrap().unwrap();
    assert_eq!(last.id, "late");
    assert!(db.last_turn("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_turn_parts_and_attachments_survive_storage() {
    let db = create_test_database().await.unwrap();
    db.create_conversation(&conversation("c1", "alice")).await.unwrap();

    let mut stored = turn("t1", "c1", Role::Assistant, Utc::now());
    stored.parts = vec![
        Part::ToolCall {
            tool_call_id: "call-1".to_owned(),
            tool_name: "get_weather".to_owned(),
            args: json!({"city": "Oslo"}),
        },
        Part::text("It is 4C"),
    ];
    stored.attachments = vec![Attachment {
        url: "https://files.example.com/a.png".to_owned(),
        name: Some("a.png".to_owned()),
        content_type: Some("image/png".to_owned()),
    }];
    db.append_turns(std::slice::from_ref(&stored)).await.unwrap();

    let loaded = db.get_turns("c1").await.unwrap().remove(0);
    assert_eq!(loaded.parts, stored.parts);
    assert_eq!(loaded.attachments, stored.attachments);
    assert_eq!(
        loaded.created_at.timestamp_micros(),
        stored.created_at.timestamp_micros()
    );
}

#[tokio::test]
async fn test_append_turns_is_atomic() {
    let db = create_test_database().await.unwrap();
    db.create_conversation(&conversation("c1", "alice")).await.unwrap();

    let result = db
        .append_turns(&[
            turn("ok", "c1", Role::User, Utc::now()),
            turn("orphan", "missing", Role::User, Utc::now()),
        ])
        .await;
    assert!(result.is_err());
    assert!(db.get_turns("c1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_turn_id_conflicts() {
    let db = create_test_database().await.unwrap();
    db.create_conversation(&conversation("c1", "alice")).await.unwrap();
    db.append_turns(&[turn("t1", "c1", Role::User, Utc::now())])
        .await
        .unwrap();

    let err = db
        .append_turns(&[turn("t1", "c1", Role::User, Utc::now())])
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceAlreadyExists);
}

#[tokio::test]
async fn test_conversation_with_turn_is_all_or_nothing() {
    let db = create_test_database().await.unwrap();
    db.create_conversation(&conversation("c1", "alice")).await.unwrap();
    db.append_turns(&[turn("t1", "c1", Role::User, Utc::now())])
        .await
        .unwrap();

    let err = db
        .create_conversation_with_turn(
            &conversation("c2", "bob"),
            &turn("t1", "c2", Role::User, Utc::now()),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ResourceAlreadyExists);
    assert!(db.get_conversation("c2").await.unwrap().is_none());

    db.create_conversation_with_turn(
        &conversation("c2", "bob"),
        &turn("t2", "c2", Role::User, Utc::now()),
    )
    .await
    .unwrap();
    assert_eq!(db.get_turns("c2").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_count_user_turns_respects_window_owner_and_role() {
    let db = create_test_database().await.unwrap();
    db.create_conversation(&conversation("c1", "alice")).await.unwrap();
    db.create_conversation(&conversation("c2", "alice")).await.unwrap();
    db.create_conversation(&conversation("c3", "bob")).await.unwrap();
    let now = Utc::now();

    db.append_turns(&[
        turn("a1", "c1", Role::User, now - Duration::hours(1)),
        turn("a2", "c1", Role::Assistant, now - Duration::hours(1)),
        turn("a3", "c2", Role::User, now - Duration::minutes(5)),
        turn("old", "c2", Role::User, now - Duration::hours(30)),
    ])
    .await
    .unwrap();
    db.append_turns(&[turn("b1", "c3", Role::User, now)])
        .await
        .unwrap();

    let since = now - Duration::hours(24);
    assert_eq!(db.count_user_turns_since("alice", since).await.unwrap(), 2);
    assert_eq!(db.count_user_turns_since("bob", since).await.unwrap(), 1);
    assert_eq!(db.count_user_turns_since("carol", since).await.unwrap(), 0);
}

// ============================================================================
// Stream Registry
// ============================================================================

#[tokio::test]
async fn test_stream_records_are_listed_oldest_first() {
    let db = create_test_database().await.unwrap();
    db.create_conversation(&conversation("c1", "alice")).await.unwrap();

    let mut first = StreamRecord::generate("c1");
    first.created_at = Utc::now() - Duration::seconds(10);
    let second = StreamRecord::generate("c1");
    db.append_stream_record(&second).await.unwrap();
    db.append_stream_record(&first).await.unwrap();

    let ids = db.list_stream_record_ids("c1").await.unwrap();
    assert_eq!(ids, vec![first.id, second.id]);
    assert!(db.list_stream_record_ids("other").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_stream_record_for_missing_conversation_fails() {
    let db = create_test_database().await.unwrap();
    let result = db.append_stream_record(&StreamRecord::generate("missing")).await;
    assert!(result.is_err());
}

// ============================================================================
// File-backed Storage
// ============================================================================

#[tokio::test]
async fn test_file_database_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let url = DatabaseUrl::SQLite {
        path: dir.path().join("nested").join("threadline.db"),
    };

    {
        let db = Database::new(&url).await.unwrap();
        db.create_conversation(&conversation("c1", "alice")).await.unwrap();
        db.append_turns(&[turn("t1", "c1", Role::User, Utc::now())])
            .await
            .unwrap();
        db.pool().close().await;
    }

    let reopened = Database::new(&url).await.unwrap();
    assert!(reopened.get_conversation("c1").await.unwrap().is_some());
    assert_eq!(reopened.get_turns("c1").await.unwrap().len(), 1);
}
