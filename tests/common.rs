// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides in-memory stores, server resources, session tokens and request builders
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]
//! Shared test utilities for `threadline_server`
//!
//! This module provides common test setup functions to reduce duplication
//! across integration tests.

use std::sync::{Arc, Once};
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use threadline_server::{
    auth::AuthManager,
    config::{DatabaseUrl, LlmProviderType, ServerConfig},
    database::{ChatStore, Database},
    llm::{GenerativeModel, ScriptedModel},
    models::{Turn, UserTier},
    resources::ServerResources,
};

static INIT_LOGGER: Once = Once::new();

/// Secret used to sign session tokens in tests
pub const TEST_JWT_SECRET: &str = "threadline-test-secret";

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Configuration for an in-memory server with a scripted model
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.database.url = DatabaseUrl::Memory;
    config.llm.provider = LlmProviderType::Scripted;
    config
}

/// Standard test database setup
pub async fn create_test_database() -> Result<Arc<Database>> {
    init_test_logging();
    let database = Database::new(&DatabaseUrl::Memory).await?;
    Ok(Arc::new(database))
}

/// Server resources backed by an in-memory store and the given model
pub async fn create_test_server_resources_with(
    model: Arc<dyn GenerativeModel>,
    config: ServerConfig,
) -> Result<Arc<ServerResources>> {
    let database = create_test_database().await?;
    let store: Arc<dyn ChatStore> = database;
    let auth_manager = AuthManager::new(TEST_JWT_SECRET.as_bytes(), 24);

    Ok(Arc::new(ServerResources::new(
        store,
        auth_manager,
        model,
        Arc::new(config),
    )))
}

/// Server resources with the echo model and default policy
pub async fn create_test_server_resources() -> Result<Arc<ServerResources>> {
    create_test_server_resources_with(Arc::new(ScriptedModel::echo()), test_config()).await
}

/// `Authorization` header value for a user
pub fn bearer(resources: &ServerResources, user_id: &str, tier: UserTier) -> String {
    let token = resources
        .auth_manager
        .generate_token(user_id, tier)
        .expect("Failed to mint test token");
    format!("Bearer {token}")
}

/// Body of a create-stream request with one text part
pub fn chat_body(conversation_id: &str, message_id: &str, text: &str) -> Value {
    json!({
        "id": conversation_id,
        "message": {
            "id": message_id,
            "role": "user",
            "parts": [{"type": "text", "text": text}]
        },
        "selectedChatModel": "default",
        "selectedVisibilityType": "private"
    })
}

/// Wait until a conversation holds at least `count` turns
pub async fn wait_for_turns(
    store: &dyn ChatStore,
    conversation_id: &str,
    count: usize,
) -> Result<Vec<Turn>> {
    for _ in 0..200 {
        let turns = store.get_turns(conversation_id).await?;
        if turns.len() >= count {
            return Ok(turns);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Err(anyhow!(
        "conversation {conversation_id} never reached {count} turns"
    ))
}

/// Wait until the multiplexer holds no handles
pub async fn wait_for_eviction(resources: &ServerResources) -> Result<()> {
    for _ in 0..200 {
        if resources.multiplexer.live_streams() == 0 {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Err(anyhow!("producer handles were never evicted"))
}
