// ABOUTME: CORS middleware configuration for HTTP API endpoints
// ABOUTME: Provides Cross-Origin Resource Sharing setup for browser chat clients
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use http::{header::HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::ServerConfig;
use crate::constants::headers;

/// Configure CORS settings for the chat API
///
/// Origins come from `CORS_ALLOWED_ORIGINS`. A single `*` (or an empty list)
/// allows any origin; otherwise only the listed origins are accepted.
///
/// # Allowed Headers
///
/// - Standard headers: content-type, authorization, accept, origin
/// - Correlation header: x-request-id
/// - Locality hints: x-geo-city, x-geo-country, x-geo-latitude, x-geo-longitude
#[must_use]
pub fn setup_cors(config: &ServerConfig) -> CorsLayer {
    let allow_origin = if config.cors_origins.is_empty()
        || config.cors_origins.iter().any(|origin| origin == "*")
    {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|origin| HeaderValue::from_str(origin).ok())
            .collect();

        if origins.is_empty() {
            AllowOrigin::any()
        } else {
            AllowOrigin::list(origins)
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("authorization"),
            HeaderName::from_static("accept"),
            HeaderName::from_static("origin"),
            HeaderName::from_static(headers::REQUEST_ID),
            HeaderName::from_static(headers::GEO_CITY),
            HeaderName::from_static(headers::GEO_COUNTRY),
            HeaderName::from_static(headers::GEO_LATITUDE),
            HeaderName::from_static(headers::GEO_LONGITUDE),
        ])
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .expose_headers([HeaderName::from_static(headers::REQUEST_ID)])
}
