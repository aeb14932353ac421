// ABOUTME: Core data models for conversations, turns, stream records and user tiers
// ABOUTME: Re-exports the domain types shared by the store, multiplexer and HTTP layers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Data Models
//!
//! - `Conversation`: owner, visibility and title of a chat thread
//! - `Turn`: one immutable persisted message with ordered content parts
//! - `StreamRecord`: registration of one producer run for a conversation
//! - `UserTier`: plan level used by the turn quota

mod conversation;
mod stream;
mod turn;
mod user;

pub use conversation::{Conversation, Visibility};
pub use stream::StreamRecord;
pub use turn::{Attachment, Part, Role, Turn};
pub use user::UserTier;
