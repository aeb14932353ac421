// ABOUTME: Conversation model with owner and visibility for access checks
// ABOUTME: Visibility decides whether non-owners may reattach to a conversation's stream
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Who may read a conversation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Only the owner
    #[default]
    Private,
    /// Any authenticated caller
    Public,
}

impl Visibility {
    /// Convert to string for database storage
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }
}

impl Display for Visibility {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "public" => Ok(Self::Public),
            _ => Err(AppError::invalid_input(format!("Invalid visibility: {s}"))),
        }
    }
}

/// A chat thread owned by one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Caller-supplied conversation ID
    pub id: String,
    /// User ID of the owner
    pub owner_id: String,
    /// Title derived from the first inbound turn
    pub title: String,
    /// Access policy
    pub visibility: Visibility,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Whether `user_id` owns this conversation
    #[must_use]
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }

    /// Whether `user_id` may read this conversation's turns and streams
    #[must_use]
    pub fn is_visible_to(&self, user_id: &str) -> bool {
        match self.visibility {
            Visibility::Public => true,
            Visibility::Private => self.is_owned_by(user_id),
        }
    }
}
