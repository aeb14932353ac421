// ABOUTME: Resumable chat streaming: wire events, producer multiplexing and replay fallback
// ABOUTME: Producers outlive the HTTP requests that start them so clients can reattach
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Resumable streams
//!
//! - **events**: the event vocabulary sent to clients
//! - **multiplexer**: live producer handles and subscriptions
//! - **replay**: bounded fallback when the producer is gone

/// Stream wire events
pub mod events;
/// Producer handle registry and subscriptions
pub mod multiplexer;
/// Replay of the last assistant turn
pub mod replay;

pub use events::StreamEvent;
pub use multiplexer::{ProducerHandle, StreamMultiplexer, Subscription};
pub use replay::{replay_from_last_turn, ReplayOutcome};
