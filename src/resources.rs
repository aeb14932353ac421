// ABOUTME: Centralized resource container shared by every HTTP handler
// ABOUTME: Wires the message log, multiplexer, model backend and coordinator together once at startup
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Server Resources
//!
//! Built once at startup and handed to the router behind an `Arc`. The
//! multiplexer and the coordinator share one store handle, so a stream
//! started by one request is visible to the reattach requests that follow.

use std::sync::Arc;

use crate::auth::AuthManager;
use crate::config::ServerConfig;
use crate::database::ChatStore;
use crate::llm::GenerativeModel;
use crate::rate_limiting::TurnQuotaPolicy;
use crate::services::ChatCoordinator;
use crate::streaming::StreamMultiplexer;

/// Shared server state
pub struct ServerResources {
    /// Loaded configuration
    pub config: Arc<ServerConfig>,
    /// Message log and stream registry
    pub store: Arc<dyn ChatStore>,
    /// Session token issuer and validator
    pub auth_manager: Arc<AuthManager>,
    /// Live producer handles
    pub multiplexer: Arc<StreamMultiplexer>,
    /// Chat request coordinator
    pub coordinator: ChatCoordinator,
}

impl ServerResources {
    /// Create server resources with proper Arc sharing
    #[must_use]
    pub fn new(
        store: Arc<dyn ChatStore>,
        auth_manager: AuthManager,
        model: Arc<dyn GenerativeModel>,
        config: Arc<ServerConfig>,
    ) -> Self {
        let multiplexer = Arc::new(StreamMultiplexer::new(
            Arc::clone(&store),
            config.streaming,
        ));
        let coordinator = ChatCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&multiplexer),
            model,
            TurnQuotaPolicy::new(config.quota),
            config.streaming,
            config.llm.clone(),
        );

        Self {
            config,
            store,
            auth_manager: Arc::new(auth_manager),
            multiplexer,
            coordinator,
        }
    }
}
