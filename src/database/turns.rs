// ABOUTME: Turn table migration and queries for the SQLite chat store
// ABOUTME: Stores content parts and attachments as JSON and appends turns transactionally
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

use super::{from_db_timestamp, to_db_timestamp, Database};
use crate::errors::{AppError, AppResult};
use crate::models::{Attachment, Part, Role, Turn};

impl Database {
    pub(super) async fn migrate_turns(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS turns (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                parts TEXT NOT NULL,
                attachments TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to create turns table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_turns_conversation ON turns(conversation_id, created_at)",
        )
        .execute(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to create turns index: {e}")))?;

        Ok(())
    }

    pub(super) async fn fetch_turns(&self, conversation_id: &str) -> AppResult<Vec<Turn>> {
        let rows = sqlx::query(
            r"
            SELECT id, conversation_id, role, parts, attachments, created_at
            FROM turns
            WHERE conversation_id = $1
            ORDER BY created_at ASC, rowid ASC
            ",
        )
        .bind(conversation_id)
        .fetch_all(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to get turns: {e}")))?;

        rows.iter().map(row_to_turn).collect()
    }

    pub(super) async fn fetch_last_turn(&self, conversation_id: &str) -> AppResult<Option<Turn>> {
        let row = sqlx::query(
            r"
            SELECT id, conversation_id, role, parts, attachments, created_at
            FROM turns
            WHERE conversation_id = $1
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            ",
        )
        .bind(conversation_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to get last turn: {e}")))?;

        row.as_ref().map(row_to_turn).transpose()
    }

    pub(super) async fn insert_turns(&self, turns: &[Turn]) -> AppResult<()> {
        if turns.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin transaction: {e}")))?;

        for turn in turns {
            insert_turn_row(&mut tx, turn).await?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::database(format!("Failed to commit turns: {e}")))?;

        Ok(())
    }

    pub(super) async fn count_user_turns(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> AppResult<u32> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*)
            FROM turns t
            JOIN conversations c ON c.id = t.conversation_id
            WHERE c.owner_id = $1 AND t.role = 'user' AND t.created_at >= $2
            ",
        )
        .bind(user_id)
        .bind(to_db_timestamp(since))
        .fetch_one(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to count user turns: {e}")))?;

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

pub(super) async fn insert_turn_row(conn: &mut SqliteConnection, turn: &Turn) -> AppResult<()> {
    let parts = serde_json::to_string(&turn.parts)?;
    let attachments = serde_json::to_string(&turn.attachments)?;

    sqlx::query(
        r"
        INSERT INTO turns (id, conversation_id, role, parts, attachments, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ",
    )
    .bind(&turn.id)
    .bind(&turn.conversation_id)
    .bind(turn.role.as_str())
    .bind(parts)
    .bind(attachments)
    .bind(to_db_timestamp(turn.created_at))
    .execute(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::conflict(format!("Turn {} already exists", turn.id))
        }
        other => AppError::database(format!("Failed to append turn {}: {other}", turn.id)),
    })?;

    Ok(())
}

fn row_to_turn(row: &SqliteRow) -> AppResult<Turn> {
    let role: String = row.get("role");
    let parts: String = row.get("parts");
    let attachments: String = row.get("attachments");
    let created_at: String = row.get("created_at");

    Ok(Turn {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        role: role.parse::<Role>()?,
        parts: serde_json::from_str::<Vec<Part>>(&parts)?,
        attachments: serde_json::from_str::<Vec<Attachment>>(&attachments)?,
        created_at: from_db_timestamp(&created_at)?,
    })
}
