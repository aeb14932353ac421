// ABOUTME: Persistent chat store for conversations, turns and stream records
// ABOUTME: Defines the ChatStore seam and its SQLite implementation with migrations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Chat Store
//!
//! The coordinator and the stream registry talk to storage through
//! [`ChatStore`]; [`Database`] is the `SQLite` implementation. Turns are
//! append-only and ordered by creation timestamp, ties broken by insertion
//! order. Deleting a conversation cascades to its turns and stream records.

mod conversations;
mod streams;
mod turns;

use std::fs;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::config::DatabaseUrl;
use crate::constants::database::{MAX_CONNECTIONS, MEMORY_DATABASE_URL};
use crate::errors::{AppError, AppResult};
use crate::models::{Conversation, StreamRecord, Turn};

/// Storage operations required by the chat coordinator and stream registry
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Fetch a conversation by ID
    async fn get_conversation(&self, conversation_id: &str) -> AppResult<Option<Conversation>>;

    /// Insert a new conversation
    async fn create_conversation(&self, conversation: &Conversation) -> AppResult<()>;

    /// Insert a new conversation and its opening turn in one transaction
    async fn create_conversation_with_turn(
        &self,
        conversation: &Conversation,
        turn: &Turn,
    ) -> AppResult<()>;

    /// Delete a conversation with its turns and stream records, returning what was removed
    async fn delete_conversation(&self, conversation_id: &str) -> AppResult<Option<Conversation>>;

    /// All turns of a conversation in creation order
    async fn get_turns(&self, conversation_id: &str) -> AppResult<Vec<Turn>>;

    /// Append turns atomically
    async fn append_turns(&self, turns: &[Turn]) -> AppResult<()>;

    /// Most recent turn of a conversation
    async fn last_turn(&self, conversation_id: &str) -> AppResult<Option<Turn>>;

    /// Number of user turns authored by `user_id` since `since`
    async fn count_user_turns_since(&self, user_id: &str, since: DateTime<Utc>) -> AppResult<u32>;

    /// Register a stream identifier
    async fn append_stream_record(&self, record: &StreamRecord) -> AppResult<()>;

    /// Stream identifiers of a conversation, oldest first
    async fn list_stream_record_ids(&self, conversation_id: &str) -> AppResult<Vec<String>>;
}

/// `SQLite`-backed chat store
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to the database and run migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be opened or migrations fail
    pub async fn new(url: &DatabaseUrl) -> AppResult<Self> {
        let pool = match url {
            DatabaseUrl::Memory => {
                // Every connection to :memory: is a separate database, so pin one
                let options = SqliteConnectOptions::from_str(MEMORY_DATABASE_URL)
                    .map_err(|e| AppError::config(format!("Invalid database URL: {e}")))?
                    .foreign_keys(true);
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect_with(options)
                    .await
            }
            DatabaseUrl::SQLite { path } => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent).map_err(|e| {
                        AppError::config(format!(
                            "Failed to create database directory {}: {e}",
                            parent.display()
                        ))
                    })?;
                }
                let options = SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .foreign_keys(true);
                SqlitePoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .connect_with(options)
                    .await
            }
        }
        .map_err(|e| AppError::database(format!("Failed to connect to {url}: {e}")))?;

        let db = Self { pool };
        db.migrate().await?;
        info!("Chat store ready at {url}");
        Ok(db)
    }

    /// Get a reference to the connection pool
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist
    ///
    /// # Errors
    ///
    /// Returns an error if a migration statement fails
    pub async fn migrate(&self) -> AppResult<()> {
        self.migrate_conversations().await?;
        self.migrate_turns().await?;
        self.migrate_stream_records().await?;
        Ok(())
    }
}

#[async_trait]
impl ChatStore for Database {
    async fn get_conversation(&self, conversation_id: &str) -> AppResult<Option<Conversation>> {
        self.fetch_conversation(conversation_id).await
    }

    async fn create_conversation(&self, conversation: &Conversation) -> AppResult<()> {
        self.insert_conversation(conversation).await
    }

    async fn create_conversation_with_turn(
        &self,
        conversation: &Conversation,
        turn: &Turn,
    ) -> AppResult<()> {
        self.insert_conversation_with_turn(conversation, turn).await
    }

    async fn delete_conversation(&self, conversation_id: &str) -> AppResult<Option<Conversation>> {
        self.remove_conversation(conversation_id).await
    }

    async fn get_turns(&self, conversation_id: &str) -> AppResult<Vec<Turn>> {
        self.fetch_turns(conversation_id).await
    }

    async fn append_turns(&self, turns: &[Turn]) -> AppResult<()> {
        self.insert_turns(turns).await
    }

    async fn last_turn(&self, conversation_id: &str) -> AppResult<Option<Turn>> {
        self.fetch_last_turn(conversation_id).await
    }

    async fn count_user_turns_since(&self, user_id: &str, since: DateTime<Utc>) -> AppResult<u32> {
        self.count_user_turns(user_id, since).await
    }

    async fn append_stream_record(&self, record: &StreamRecord) -> AppResult<()> {
        self.insert_stream_record(record).await
    }

    async fn list_stream_record_ids(&self, conversation_id: &str) -> AppResult<Vec<String>> {
        self.fetch_stream_record_ids(conversation_id).await
    }
}

/// Format a timestamp so lexical order matches chronological order
fn to_db_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
fn from_db_timestamp(raw: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AppError::database(format!("Invalid stored timestamp {raw:?}: {e}")))
}
