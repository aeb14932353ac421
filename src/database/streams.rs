// ABOUTME: Stream record table migration and queries for the SQLite chat store
// ABOUTME: Stream records are append-only and listed oldest first per conversation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::{to_db_timestamp, Database};
use crate::errors::{AppError, AppResult};
use crate::models::StreamRecord;

impl Database {
    pub(super) async fn migrate_stream_records(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS stream_records (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to create stream_records table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_stream_records_conversation ON stream_records(conversation_id, created_at)",
        )
        .execute(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to create stream_records index: {e}")))?;

        Ok(())
    }

    pub(super) async fn insert_stream_record(&self, record: &StreamRecord) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO stream_records (id, conversation_id, created_at)
            VALUES ($1, $2, $3)
            ",
        )
        .bind(&record.id)
        .bind(&record.conversation_id)
        .bind(to_db_timestamp(record.created_at))
        .execute(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to record stream: {e}")))?;

        Ok(())
    }

    pub(super) async fn fetch_stream_record_ids(
        &self,
        conversation_id: &str,
    ) -> AppResult<Vec<String>> {
        sqlx::query_scalar(
            r"
            SELECT id
            FROM stream_records
            WHERE conversation_id = $1
            ORDER BY created_at ASC, rowid ASC
            ",
        )
        .bind(conversation_id)
        .fetch_all(self.pool())
        .await
        .map_err(|e| AppError::database(format!("Failed to list stream records: {e}")))
    }
}
