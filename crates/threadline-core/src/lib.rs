// ABOUTME: Core types for the Threadline resumable chat streaming server
// ABOUTME: Foundation crate with error handling and conversation domain models
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![deny(unsafe_code)]

//! # Threadline Core
//!
//! Foundation crate providing the shared types of the Threadline server. This
//! crate is designed to change infrequently, enabling incremental compilation
//! benefits in the workspace.
//!
//! ## Modules
//!
//! - **errors**: Unified error handling with `AppError`, `ErrorCode`, and stream errors
//! - **models**: Conversations, turns, content parts, stream records and user tiers

/// Unified error handling system with standard error codes and HTTP responses
pub mod errors;

/// Core data models (Conversation, Turn, `StreamRecord`, `UserTier`)
pub mod models;
