// ABOUTME: Re-exports the conversation domain models from threadline-core
// ABOUTME: Conversation, Turn, Part, StreamRecord and UserTier
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Data Models

pub use threadline_core::models::{
    Attachment, Conversation, Part, Role, StreamRecord, Turn, UserTier, Visibility,
};
