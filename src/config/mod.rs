// ABOUTME: Configuration management module for centralized server settings
// ABOUTME: Environment-only configuration with strongly typed sub-configs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Configuration module for the Threadline server
//!
//! - **Environment**: Server configuration from environment variables
//! - **Types**: Log level, deployment environment and model backend enums

/// Environment and server configuration
pub mod environment;
/// Shared configuration enums
pub mod types;

pub use environment::{
    AuthConfig, DatabaseConfig, DatabaseUrl, LlmConfig, QuotaConfig, ServerConfig,
    StreamingConfig,
};
pub use types::{Environment, LlmProviderType, LogLevel};
