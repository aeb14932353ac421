// ABOUTME: Service layer for chat business logic shared by the HTTP routes
// ABOUTME: Request coordination and post-stream reconciliation live here
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Chat services
//!
//! Route handlers stay thin and delegate here.

/// Create, resume and delete chat streams
pub mod chat_coordinator;
/// Fold a finished stream into one persisted assistant turn
pub mod reconciler;

pub use chat_coordinator::{
    derive_title, ChatCoordinator, ChatRequest, InboundMessage, ResumeOutcome,
};
pub use reconciler::{
    group_response_messages, reconcile_turn, spawn_reconciliation, ReconcileError,
    ResponseMessage,
};
