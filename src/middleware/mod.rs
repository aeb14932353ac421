// ABOUTME: HTTP middleware for request tracing and cross-origin access
// ABOUTME: Provides request ID generation, span creation and CORS configuration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// CORS configuration
pub mod cors;
/// Request IDs and request spans
pub mod tracing;

pub use self::cors::setup_cors;
pub use self::tracing::{create_request_span, with_request_tracing};
