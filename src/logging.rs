// ABOUTME: Logging configuration and structured logging setup for observability and debugging
// ABOUTME: Configures log levels, formatters, noise filters and stream lifecycle log helpers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Production-ready logging configuration with structured output

use std::env;
use std::io;

use anyhow::{anyhow, Result};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{
    filter::Directive,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::constants::service_names;

/// Logging configuration
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty, compact)
    pub format: LogFormat,
    /// Include source file and line numbers
    pub include_location: bool,
    /// Include thread information
    pub include_thread: bool,
    /// Include span information for tracing
    pub include_spans: bool,
    /// Service name for structured logging
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Environment (development, staging, production)
    pub environment: String,
}

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// `JSON` format for production logging
    Json,
    /// Pretty format for development
    Pretty,
    /// Compact format for space-constrained environments
    Compact,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Pretty,
            include_location: false,
            include_thread: false,
            include_spans: false,
            service_name: service_names::THREADLINE_SERVER.into(),
            service_version: service_names::SERVER_VERSION.to_owned(),
            environment: "development".into(),
        }
    }
}

/// Noise reduction applied regardless of `RUST_LOG`
const NOISE_DIRECTIVES: [&str; 5] = [
    "hyper=warn",
    "hyper::proto=warn",
    "reqwest=warn",
    "sqlx::query=warn",
    "tower_http=info",
];

impl LoggingConfig {
    /// Create logging configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info".into());

        let format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") => LogFormat::Compact,
            _ => LogFormat::Pretty,
        };

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());

        // In production, use more detailed logging
        let is_production = environment == "production";

        Self {
            level,
            format,
            include_location: is_production || env::var("LOG_INCLUDE_LOCATION").is_ok(),
            include_thread: is_production || env::var("LOG_INCLUDE_THREAD").is_ok(),
            include_spans: is_production || env::var("LOG_INCLUDE_SPANS").is_ok(),
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| service_names::THREADLINE_SERVER.into()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| service_names::SERVER_VERSION.to_owned()),
            environment,
        }
    }

    /// Build the environment filter with noise reduction rules
    ///
    /// # Errors
    ///
    /// Returns an error if the configured level is not a valid filter directive
    pub fn env_filter(&self) -> Result<EnvFilter> {
        let mut filter = EnvFilter::try_new(&self.level)
            .map_err(|e| anyhow!("Invalid log filter {:?}: {e}", self.level))?;

        for directive in NOISE_DIRECTIVES {
            let parsed: Directive = directive
                .parse()
                .map_err(|e| anyhow!("Invalid noise directive {directive}: {e}"))?;
            filter = filter.add_directive(parsed);
        }

        Ok(filter)
    }

    /// Initialize the global tracing subscriber
    ///
    /// # Errors
    ///
    /// Returns an error if the filter is invalid or a global subscriber is already set
    pub fn init(&self) -> Result<()> {
        let registry = tracing_subscriber::registry().with(self.env_filter()?);
        let span_events = if self.include_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let result = match self.format {
            LogFormat::Json => registry
                .with(
                    fmt::layer()
                        .with_file(self.include_location)
                        .with_line_number(self.include_location)
                        .with_thread_ids(self.include_thread)
                        .with_thread_names(self.include_thread)
                        .with_target(true)
                        .with_writer(io::stdout)
                        .with_span_events(span_events)
                        .json(),
                )
                .try_init(),
            LogFormat::Pretty => registry
                .with(
                    fmt::layer()
                        .with_file(self.include_location)
                        .with_line_number(self.include_location)
                        .with_thread_ids(self.include_thread)
                        .with_thread_names(self.include_thread)
                        .with_target(true)
                        .with_writer(io::stdout)
                        .with_span_events(span_events),
                )
                .try_init(),
            LogFormat::Compact => registry
                .with(
                    fmt::layer()
                        .compact()
                        .with_target(false)
                        .with_writer(io::stdout)
                        .with_span_events(FmtSpan::NONE),
                )
                .try_init(),
        };
        result.map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))?;

        self.log_startup_info();

        Ok(())
    }

    /// Log structured startup information
    fn log_startup_info(&self) {
        info!(
            service.name = %self.service_name,
            service.version = %self.service_version,
            environment = %self.environment,
            log.level = %self.level,
            log.format = ?self.format,
            "Threadline server starting up"
        );

        let config_summary = json!({
            "service": {
                "name": self.service_name,
                "version": self.service_version,
                "environment": self.environment
            },
            "logging": {
                "level": self.level,
                "format": format!("{:?}", self.format),
                "features": {
                    "location": self.include_location,
                    "thread": self.include_thread,
                    "spans": self.include_spans
                }
            }
        });

        info!("Logging configured: {}", config_summary);
    }
}

/// Initialize logging from environment
///
/// # Errors
///
/// Returns an error if logging initialization fails
pub fn init_from_env() -> Result<()> {
    LoggingConfig::from_env().init()
}

/// Structured log events for the stream lifecycle
pub struct StreamLogger;

impl StreamLogger {
    /// A producer was registered and spawned
    pub fn log_stream_started(stream_id: &str, conversation_id: &str) {
        info!(
            stream.id = %stream_id,
            conversation.id = %conversation_id,
            "Stream started"
        );
    }

    /// A subscriber reattached to a live producer
    pub fn log_stream_resumed(stream_id: &str, conversation_id: &str, from: usize) {
        info!(
            stream.id = %stream_id,
            conversation.id = %conversation_id,
            stream.from = from,
            "Stream resumed"
        );
    }

    /// A producer reached its terminal event
    pub fn log_stream_finished(stream_id: &str, events: usize, failed: bool) {
        if failed {
            warn!(stream.id = %stream_id, stream.events = events, "Stream finished with error");
        } else {
            info!(stream.id = %stream_id, stream.events = events, "Stream finished");
        }
    }

    /// A finished handle left the registry
    pub fn log_stream_evicted(stream_id: &str) {
        tracing::debug!(stream.id = %stream_id, "Finished stream handle evicted");
    }

    /// The replay fallback answered a reattach request
    pub fn log_replay(conversation_id: &str, replayed: bool) {
        info!(
            conversation.id = %conversation_id,
            replay.delivered = replayed,
            "Stream replay fallback"
        );
    }

    /// An access check rejected a caller
    pub fn log_access_denied(user_id: &str, conversation_id: &str, action: &str) {
        warn!(
            user.id = %user_id,
            conversation.id = %conversation_id,
            access.action = %action,
            "Conversation access denied"
        );
    }

    /// The quota check rejected a caller
    pub fn log_quota_rejected(user_id: &str, tier: &str, used: u32, limit: u32) {
        warn!(
            user.id = %user_id,
            user.tier = %tier,
            quota.used = used,
            quota.limit = limit,
            "Turn quota exceeded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.service_name, service_names::THREADLINE_SERVER);
    }

    #[test]
    fn test_env_filter_accepts_module_directives() {
        let config = LoggingConfig {
            level: "threadline_server=debug,info".into(),
            ..LoggingConfig::default()
        };
        assert!(config.env_filter().is_ok());
    }

    #[test]
    fn test_env_filter_rejects_garbage() {
        let config = LoggingConfig {
            level: "threadline_server=loudest".into(),
            ..LoggingConfig::default()
        };
        assert!(config.env_filter().is_err());
    }
}
