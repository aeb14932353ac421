// ABOUTME: Conversation table migration and queries for the SQLite chat store
// ABOUTME: Handles create, lookup and cascading delete of conversations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

use super::turns::insert_turn_row;
use super::{from_db_timestamp, to_db_timestamp, Database};
use crate::errors::{AppError, AppResult};
use crate::models::{Conversation, Turn, Visibility};

impl Database {
    pub(super) async fn migrate_conversations(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                title TEXT NOT NULL,
                visibility TEXT NOT NULL DEFAULT 'private' CHECK (visibility IN ('private', 'public')),
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to create conversations table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_conversations_owner ON conversations(owner_id)")
            .execute(self.pool())
            .await
            .map_err(|e| {
                AppError::database(format!("Failed to create conversations owner index: {e}"))
            })?;

        Ok(())
    }

    pub(super) async fn fetch_conversation(
        &self,
        conversation_id: &str,
    ) -> AppResult<Option<Conversation>> {
        let row = sqlx::query(
            r"
            SELECT id, owner_id, title, visibility, created_at
            FROM conversations
            WHERE id = $1
            ",
        )
        .bind(conversation_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to get conversation: {e}")))?;

        row.as_ref().map(row_to_conversation).transpose()
    }

    pub(super) async fn insert_conversation(&self, conversation: &Conversation) -> AppResult<()> {
        let mut conn = self
            .pool()
            .acquire()
            .await
            .map_err(|e| AppError::database(format!("Failed to acquire connection: {e}")))?;
        insert_conversation_row(&mut conn, conversation).await
    }

    /// Create a conversation together with its first turn; neither is kept if either insert fails
    pub(super) async fn insert_conversation_with_turn(
        &self,
        conversation: &Conversation,
        turn: &Turn,
    ) -> AppResult<()> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {e}")))?;

        insert_conversation_row(&mut tx, conversation).await?;
        insert_turn_row(&mut tx, turn).await?;

        tx.commit()
            .await
            .map_err(|e| AppError::database(format!("Failed to commit conversation: {e}")))?;

        Ok(())
    }

    pub(super) async fn remove_conversation(
        &self,
        conversation_id: &str,
    ) -> AppResult<Option<Conversation>> {
        let Some(existing) = self.fetch_conversation(conversation_id).await? else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM conversations WHERE id = $1")
            .bind(conversation_id)
            .execute(self.pool())
            .await
            .map_err(|e| AppError::database(format!("Failed to delete conversation: {e}")))?;

        Ok(Some(existing))
    }
}

async fn insert_conversation_row(
    conn: &mut SqliteConnection,
    conversation: &Conversation,
) -> AppResult<()> {
    sqlx::query(
        r"
        INSERT INTO conversations (id, owner_id, title, visibility, created_at)
        VALUES ($1, $2, $3, $4, $5)
        ",
    )
    .bind(&conversation.id)
    .bind(&conversation.owner_id)
    .bind(&conversation.title)
    .bind(conversation.visibility.as_str())
    .bind(to_db_timestamp(conversation.created_at))
    .execute(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::conflict(format!(
            "Conversation {} already exists",
            conversation.id
        )),
        other => AppError::database(format!("Failed to create conversation: {other}")),
    })?;

    Ok(())
}

fn row_to_conversation(row: &SqliteRow) -> AppResult<Conversation> {
    let visibility: String = row.get("visibility");
    let created_at: String = row.get("created_at");
    Ok(Conversation {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        title: row.get("title"),
        visibility: visibility.parse::<Visibility>()?,
        created_at: from_db_timestamp(&created_at)?,
    })
}
