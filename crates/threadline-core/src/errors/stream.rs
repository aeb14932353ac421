// ABOUTME: Stream multiplexer error types for start/resume of producer handles
// ABOUTME: Provides structured errors that integrate with the main AppError system
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Stream Error Types
//!
//! - `StreamError` - failures reported by the stream multiplexer
//! - Conversion to `AppError` for HTTP response formatting

use thiserror::Error;

use super::{AppError, ErrorCode};

/// Errors reported when starting or resuming a stream
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    /// A live handle is already registered under this stream identifier
    #[error("stream {stream_id} is already registered")]
    Conflict {
        /// Colliding stream identifier
        stream_id: String,
    },
    /// The conversation has never had a stream registered
    #[error("conversation {conversation_id} has no registered streams")]
    NoStreamRecord {
        /// Conversation that was looked up
        conversation_id: String,
    },
    /// The most recent stream has no live producer handle
    #[error("stream {stream_id} has no live producer")]
    NotLive {
        /// Most recent stream identifier of the conversation
        stream_id: String,
    },
    /// The stream registry could not be read
    #[error("stream registry lookup failed: {message}")]
    Registry {
        /// Underlying failure
        message: String,
    },
}

impl From<StreamError> for AppError {
    fn from(error: StreamError) -> Self {
        match &error {
            // Fresh identifiers never collide in practice; a collision is a server bug.
            StreamError::Conflict { .. } | StreamError::Registry { .. } => {
                Self::new(ErrorCode::InternalError, error.to_string())
            }
            StreamError::NoStreamRecord { .. } | StreamError::NotLive { .. } => {
                Self::new(ErrorCode::ResourceNotFound, error.to_string())
            }
        }
    }
}
