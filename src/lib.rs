// ABOUTME: Main library entry point for the Threadline resumable chat server
// ABOUTME: Provides durable conversation logs and reattachable model response streams over HTTP
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![deny(unsafe_code)]

//! # Threadline Server
//!
//! A chat backend whose model responses survive client disconnects. Each
//! request persists the user's turn, starts a producer for the response and
//! streams its events back. A client that drops can reattach to the same
//! stream and continue exactly where it stopped; once the producer is gone,
//! a recent final answer is replayed as one message.
//!
//! ## Architecture
//!
//! - **Database**: message log and stream registry on SQLite
//! - **Streaming**: stream multiplexer and bounded replay fallback
//! - **Services**: request coordinator and reconciler
//! - **LLM**: generative model backends
//! - **Routes**: HTTP surface with server-sent events
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use threadline_server::config::ServerConfig;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::from_env()?;
//!     println!("Threadline configured with port: HTTP={}", config.http_port);
//!     Ok(())
//! }
//! ```

/// Session tokens and caller identity
pub mod auth;

/// Environment configuration
pub mod config;

/// Application constants
pub mod constants;

/// Message log and stream registry
pub mod database;

/// Unified error types
pub mod errors;

/// Generative model backends
pub mod llm;

/// Logging setup and structured stream events
pub mod logging;

/// HTTP middleware
pub mod middleware;

/// Domain models
pub mod models;

/// Per-tier turn quota
pub mod rate_limiting;

/// Shared server state
pub mod resources;

/// HTTP routes
pub mod routes;

/// Chat business logic
pub mod services;

/// Resumable streams
pub mod streaming;
