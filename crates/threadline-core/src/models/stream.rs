// ABOUTME: Stream record model registering one producer run per conversation
// ABOUTME: Records are append-only; only the newest one per conversation is resumable
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable registration of a stream identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    /// Stream identifier generated at registration time
    pub id: String,
    /// Owning conversation
    pub conversation_id: String,
    /// Registration timestamp
    pub created_at: DateTime<Utc>,
}

impl StreamRecord {
    /// Register a fresh stream identifier for `conversation_id`
    #[must_use]
    pub fn generate(conversation_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_owned(),
            created_at: Utc::now(),
        }
    }
}
