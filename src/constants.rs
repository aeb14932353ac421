// ABOUTME: System-wide constants and configuration defaults for the Threadline server
// ABOUTME: Contains service names, stream policy defaults, quota defaults and header names
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Constants Module
//!
//! Application constants and the defaults applied when an environment variable
//! is not set. Environment parsing itself lives in `config::environment`.

/// Service identity
pub mod service_names {
    /// Name used in logs and the health endpoint
    pub const THREADLINE_SERVER: &str = "threadline-server";

    /// Server version from Cargo.toml
    pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// Network defaults
pub mod ports {
    /// Default HTTP port
    pub const DEFAULT_HTTP_PORT: u16 = 8080;

    /// Default bind address
    pub const DEFAULT_HOST: &str = "0.0.0.0";
}

/// Storage defaults
pub mod database {
    /// Default `SQLite` file location
    pub const DEFAULT_DATABASE_URL: &str = "sqlite:./data/threadline.db";

    /// In-memory database URL used by tests
    pub const MEMORY_DATABASE_URL: &str = "sqlite::memory:";

    /// Connection pool size for file-backed databases
    pub const MAX_CONNECTIONS: u32 = 8;
}

/// Resumable stream policy
pub mod streaming {
    /// A finished assistant turn younger than this is replayed on reattach
    pub const DEFAULT_REPLAY_WINDOW_SECS: u64 = 15;

    /// How long a finished producer handle stays attachable
    pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 5;

    /// Upper bound on a single producer run
    pub const DEFAULT_PRODUCER_TIMEOUT_SECS: u64 = 300;

    /// Trailer written after the terminal event of every SSE body
    pub const DONE_SENTINEL: &str = "[DONE]";
}

/// Turn quota defaults
pub mod quota {
    /// Trailing window the quota is counted over
    pub const DEFAULT_WINDOW_HOURS: u32 = 24;

    /// Starter tier allowance per window
    pub const DEFAULT_STARTER_TURNS: u32 = 20;

    /// Professional tier allowance per window
    pub const DEFAULT_PROFESSIONAL_TURNS: u32 = 100;
}

/// Conversation defaults
pub mod conversation {
    /// Maximum characters of a derived title
    pub const TITLE_MAX_CHARS: usize = 80;

    /// Title used when the first turn carries no text
    pub const DEFAULT_TITLE: &str = "New conversation";
}

/// Authentication defaults
pub mod auth {
    /// Session token lifetime
    pub const DEFAULT_JWT_EXPIRY_HOURS: i64 = 24;

    /// Cookie carrying the session token for browser clients
    pub const AUTH_COOKIE_NAME: &str = "auth_token";

    /// Secret used only in development and testing environments
    pub const DEVELOPMENT_JWT_SECRET: &str = "threadline-development-secret-do-not-deploy";
}

/// Request headers read by the server
pub mod headers {
    /// City hint supplied by the edge proxy
    pub const GEO_CITY: &str = "x-geo-city";
    /// Country hint supplied by the edge proxy
    pub const GEO_COUNTRY: &str = "x-geo-country";
    /// Latitude hint supplied by the edge proxy
    pub const GEO_LATITUDE: &str = "x-geo-latitude";
    /// Longitude hint supplied by the edge proxy
    pub const GEO_LONGITUDE: &str = "x-geo-longitude";
    /// Request correlation header
    pub const REQUEST_ID: &str = "x-request-id";
}

/// Generative model defaults
pub mod llm {
    /// Default OpenAI-compatible endpoint (Ollama)
    pub const DEFAULT_BASE_URL: &str = "http://localhost:11434/v1";

    /// Default model selector
    pub const DEFAULT_MODEL: &str = "qwen2.5:14b-instruct";

    /// Connection timeout for model backends
    pub const CONNECT_TIMEOUT_SECS: u64 = 30;

    /// Request timeout for a streaming completion
    pub const REQUEST_TIMEOUT_SECS: u64 = 300;
}
