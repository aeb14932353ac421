// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Parses ports, database URL, JWT, stream policy, quota and model backend from env vars
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Environment-based configuration management for production deployment

use std::env;
use std::fmt::{self, Debug, Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::{info, warn};

use super::types::{Environment, LlmProviderType, LogLevel};
use crate::constants::{auth, database, llm, ports, quota, streaming};
use crate::models::UserTier;

/// Type-safe database configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseUrl {
    /// `SQLite` database with file path
    SQLite {
        /// Database file location
        path: PathBuf,
    },
    /// In-memory `SQLite` (for testing)
    Memory,
}

impl DatabaseUrl {
    /// Parse from string; anything that is not `sqlite:` prefixed is treated as a file path
    #[must_use]
    pub fn parse_url(s: &str) -> Self {
        let path_str = s.strip_prefix("sqlite:").unwrap_or(s);
        if path_str == ":memory:" {
            Self::Memory
        } else {
            Self::SQLite {
                path: PathBuf::from(path_str.trim_start_matches("//")),
            }
        }
    }

    /// Convert to connection string
    #[must_use]
    pub fn to_connection_string(&self) -> String {
        match self {
            Self::SQLite { path } => format!("sqlite:{}", path.display()),
            Self::Memory => database::MEMORY_DATABASE_URL.to_owned(),
        }
    }

    /// Check if this is an in-memory database
    #[must_use]
    pub const fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }
}

impl Default for DatabaseUrl {
    fn default() -> Self {
        Self::parse_url(database::DEFAULT_DATABASE_URL)
    }
}

impl Display for DatabaseUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_connection_string())
    }
}

/// Database configuration
#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    /// Where conversations are stored
    pub url: DatabaseUrl,
}

/// Session token configuration
#[derive(Clone)]
pub struct AuthConfig {
    /// HMAC secret for HS256 session tokens
    pub jwt_secret: String,
    /// Lifetime of issued tokens
    pub jwt_expiry_hours: i64,
}

impl Debug for AuthConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_expiry_hours", &self.jwt_expiry_hours)
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: auth::DEVELOPMENT_JWT_SECRET.to_owned(),
            jwt_expiry_hours: auth::DEFAULT_JWT_EXPIRY_HOURS,
        }
    }
}

/// Resumable stream policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamingConfig {
    /// When false, reattach requests answer 204 without touching the multiplexer
    pub resumable_enabled: bool,
    /// Maximum age of an assistant turn eligible for replay (inclusive)
    pub replay_window: Duration,
    /// How long a finished producer handle stays attachable
    pub grace_period: Duration,
    /// Upper bound on a single producer run
    pub producer_timeout: Duration,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            resumable_enabled: true,
            replay_window: Duration::from_secs(streaming::DEFAULT_REPLAY_WINDOW_SECS),
            grace_period: Duration::from_secs(streaming::DEFAULT_GRACE_PERIOD_SECS),
            producer_timeout: Duration::from_secs(streaming::DEFAULT_PRODUCER_TIMEOUT_SECS),
        }
    }
}

/// Per-tier turn allowance over a trailing window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaConfig {
    /// Trailing window length
    pub window_hours: u32,
    /// Starter tier allowance
    pub starter: u32,
    /// Professional tier allowance
    pub professional: u32,
    /// Enterprise tier allowance, unlimited when `None`
    pub enterprise: Option<u32>,
}

impl QuotaConfig {
    /// Allowance for `tier`, `None` meaning unlimited
    #[must_use]
    pub const fn max_turns(&self, tier: UserTier) -> Option<u32> {
        match tier {
            UserTier::Starter => Some(self.starter),
            UserTier::Professional => Some(self.professional),
            UserTier::Enterprise => self.enterprise,
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            window_hours: quota::DEFAULT_WINDOW_HOURS,
            starter: quota::DEFAULT_STARTER_TURNS,
            professional: quota::DEFAULT_PROFESSIONAL_TURNS,
            enterprise: None,
        }
    }
}

/// Generative model backend configuration
#[derive(Clone)]
pub struct LlmConfig {
    /// Which backend to construct
    pub provider: LlmProviderType,
    /// Base URL of the OpenAI-compatible API
    pub base_url: String,
    /// Bearer key, optional for local servers
    pub api_key: Option<String>,
    /// Model used when the request does not select one
    pub default_model: String,
    /// Selectors accepted from clients; empty accepts any
    pub allowed_models: Vec<String>,
}

impl LlmConfig {
    /// Whether a client-supplied model selector is acceptable
    #[must_use]
    pub fn is_model_allowed(&self, model: &str) -> bool {
        self.allowed_models.is_empty() || self.allowed_models.iter().any(|m| m == model)
    }
}

impl Debug for LlmConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("default_model", &self.default_model)
            .field("allowed_models", &self.allowed_models)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderType::default(),
            base_url: llm::DEFAULT_BASE_URL.to_owned(),
            api_key: None,
            default_model: llm::DEFAULT_MODEL.to_owned(),
            allowed_models: Vec::new(),
        }
    }
}

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP API port
    pub http_port: u16,
    /// Bind address
    pub host: String,
    /// Deployment environment
    pub environment: Environment,
    /// Log level
    pub log_level: LogLevel,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Session token configuration
    pub auth: AuthConfig,
    /// Resumable stream policy
    pub streaming: StreamingConfig,
    /// Turn quota
    pub quota: QuotaConfig,
    /// Generative model backend
    pub llm: LlmConfig,
    /// Allowed CORS origins (`*` for any)
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: ports::DEFAULT_HTTP_PORT,
            host: ports::DEFAULT_HOST.to_owned(),
            environment: Environment::Development,
            log_level: LogLevel::Info,
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            streaming: StreamingConfig::default(),
            quota: QuotaConfig::default(),
            llm: LlmConfig::default(),
            cors_origins: vec!["*".to_owned()],
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparsable value, or if
    /// `JWT_SECRET` is missing in production
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");

        let environment = Environment::from_str_or_default(&env_var_or("ENVIRONMENT", "development"));

        let config = Self {
            http_port: env_parse("HTTP_PORT", ports::DEFAULT_HTTP_PORT)?,
            host: env_var_or("HOST", ports::DEFAULT_HOST),
            environment,
            log_level: LogLevel::from_str_or_default(&env_var_or("RUST_LOG", "info")),
            database: DatabaseConfig {
                url: DatabaseUrl::parse_url(&env_var_or(
                    "DATABASE_URL",
                    database::DEFAULT_DATABASE_URL,
                )),
            },
            auth: AuthConfig {
                jwt_secret: jwt_secret_from_env(environment)?,
                jwt_expiry_hours: env_parse("JWT_EXPIRY_HOURS", auth::DEFAULT_JWT_EXPIRY_HOURS)?,
            },
            streaming: StreamingConfig {
                resumable_enabled: env_parse("RESUMABLE_STREAMS_ENABLED", true)?,
                replay_window: Duration::from_secs(env_parse(
                    "STREAM_REPLAY_WINDOW_SECS",
                    streaming::DEFAULT_REPLAY_WINDOW_SECS,
                )?),
                grace_period: Duration::from_secs(env_parse(
                    "STREAM_GRACE_PERIOD_SECS",
                    streaming::DEFAULT_GRACE_PERIOD_SECS,
                )?),
                producer_timeout: Duration::from_secs(env_parse(
                    "PRODUCER_TIMEOUT_SECS",
                    streaming::DEFAULT_PRODUCER_TIMEOUT_SECS,
                )?),
            },
            quota: QuotaConfig {
                window_hours: env_parse("QUOTA_WINDOW_HOURS", quota::DEFAULT_WINDOW_HOURS)?,
                starter: env_parse("MAX_TURNS_STARTER", quota::DEFAULT_STARTER_TURNS)?,
                professional: env_parse(
                    "MAX_TURNS_PROFESSIONAL",
                    quota::DEFAULT_PROFESSIONAL_TURNS,
                )?,
                enterprise: env_parse_optional("MAX_TURNS_ENTERPRISE")?,
            },
            llm: LlmConfig {
                provider: LlmProviderType::from_str_or_default(&env_var_or(
                    LlmProviderType::ENV_VAR,
                    "openai",
                )),
                base_url: env_var_or("LLM_BASE_URL", llm::DEFAULT_BASE_URL),
                api_key: env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty()),
                default_model: env_var_or("LLM_DEFAULT_MODEL", llm::DEFAULT_MODEL),
                allowed_models: parse_list(&env_var_or("LLM_MODELS", "")),
            },
            cors_origins: parse_origins(&env_var_or("CORS_ALLOWED_ORIGINS", "*")),
        };

        config.validate()?;
        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns an error if a duration or allowance is zero where it must be positive
    pub fn validate(&self) -> Result<()> {
        if self.streaming.producer_timeout.is_zero() {
            return Err(anyhow!("PRODUCER_TIMEOUT_SECS must be greater than zero"));
        }
        if self.quota.window_hours == 0 {
            return Err(anyhow!("QUOTA_WINDOW_HOURS must be greater than zero"));
        }
        if self.auth.jwt_expiry_hours <= 0 {
            return Err(anyhow!("JWT_EXPIRY_HOURS must be greater than zero"));
        }
        if !self.llm.allowed_models.is_empty() && !self.llm.is_model_allowed(&self.llm.default_model)
        {
            warn!(
                "LLM_DEFAULT_MODEL {} is not in LLM_MODELS; requests must select a model explicitly",
                self.llm.default_model
            );
        }
        Ok(())
    }

    /// Get a summary of the configuration for logging (without secrets)
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Threadline Server Configuration:\n\
             - Environment: {}\n\
             - Listen: {}:{}\n\
             - Database: {}\n\
             - Resumable Streams: {}\n\
             - Replay Window: {}s\n\
             - Grace Period: {}s\n\
             - Producer Timeout: {}s\n\
             - Quota Window: {}h (starter {}, professional {}, enterprise {})\n\
             - LLM Provider: {} ({})",
            self.environment,
            self.host,
            self.http_port,
            if self.database.url.is_memory() {
                "SQLite (memory)"
            } else {
                "SQLite"
            },
            if self.streaming.resumable_enabled {
                "Enabled"
            } else {
                "Disabled"
            },
            self.streaming.replay_window.as_secs(),
            self.streaming.grace_period.as_secs(),
            self.streaming.producer_timeout.as_secs(),
            self.quota.window_hours,
            self.quota.starter,
            self.quota.professional,
            self.quota
                .enterprise
                .map_or_else(|| "unlimited".to_owned(), |n| n.to_string()),
            self.llm.provider,
            self.llm.default_model,
        )
    }
}

/// Read `JWT_SECRET`, falling back to the development secret outside production
fn jwt_secret_from_env(environment: Environment) -> Result<String> {
    match env::var("JWT_SECRET") {
        Ok(secret) if !secret.is_empty() => Ok(secret),
        _ if environment.is_production() => {
            Err(anyhow!("JWT_SECRET must be set when ENVIRONMENT=production"))
        }
        _ => {
            warn!("JWT_SECRET not set; using the development secret");
            Ok(auth::DEVELOPMENT_JWT_SECRET.to_owned())
        }
    }
}

/// Get environment variable or default value
fn env_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

/// Parse an environment variable, using `default` when unset or blank
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("Invalid {key} value {raw:?}: {e}")),
        _ => Ok(default),
    }
}

/// Parse an optional environment variable
fn env_parse_optional<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow!("Invalid {key} value {raw:?}: {e}")),
        _ => Ok(None),
    }
}

/// Parse a comma-separated list
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Parse comma-separated CORS origins
fn parse_origins(origins_str: &str) -> Vec<String> {
    if origins_str.trim() == "*" {
        vec!["*".to_owned()]
    } else {
        parse_list(origins_str)
    }
}
