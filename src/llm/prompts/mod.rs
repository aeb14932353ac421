// ABOUTME: System prompt assembly with request locality hints from edge headers
// ABOUTME: Base prompt is loaded at compile time; geo hints are appended when present
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # System Prompts
//!
//! The base prompt lives in a markdown file for easy editing. Deployments
//! behind an edge proxy receive coarse location headers (`x-geo-city`,
//! `x-geo-country`, `x-geo-latitude`, `x-geo-longitude`); when present they are
//! folded into the prompt so answers can be localized.

use std::fmt::Write as _;

use http::HeaderMap;

use crate::constants::headers::{GEO_CITY, GEO_COUNTRY, GEO_LATITUDE, GEO_LONGITUDE};

/// Base assistant instructions
pub const ASSISTANT_SYSTEM_PROMPT: &str = include_str!("assistant_system.md");

/// Locality hints about where a request originated
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHints {
    /// City name
    pub city: Option<String>,
    /// Country name or code
    pub country: Option<String>,
    /// Latitude as sent by the proxy
    pub latitude: Option<String>,
    /// Longitude as sent by the proxy
    pub longitude: Option<String>,
}

impl RequestHints {
    /// Read hints from request headers, ignoring blank values
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToOwned::to_owned)
        };
        Self {
            city: read(GEO_CITY),
            country: read(GEO_COUNTRY),
            latitude: read(GEO_LATITUDE),
            longitude: read(GEO_LONGITUDE),
        }
    }

    /// Whether no hint is present
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.city.is_none()
            && self.country.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
    }
}

/// Build the system prompt for one request
#[must_use]
pub fn system_prompt(hints: &RequestHints) -> String {
    let mut prompt = ASSISTANT_SYSTEM_PROMPT.trim_end().to_owned();
    if hints.is_empty() {
        return prompt;
    }

    prompt.push_str("\n\nAbout the origin of the user's request:\n");
    let fields = [
        ("city", &hints.city),
        ("country", &hints.country),
        ("lat", &hints.latitude),
        ("lon", &hints.longitude),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            // Writing to a String cannot fail
            let _ = writeln!(prompt, "- {label}: {value}");
        }
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_prompt_without_hints_is_base_prompt() {
        assert_eq!(
            system_prompt(&RequestHints::default()),
            ASSISTANT_SYSTEM_PROMPT.trim_end()
        );
    }

    #[test]
    fn test_hints_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(GEO_CITY, HeaderValue::from_static("Lyon"));
        headers.insert(GEO_COUNTRY, HeaderValue::from_static("FR"));
        headers.insert(GEO_LATITUDE, HeaderValue::from_static("  "));

        let hints = RequestHints::from_headers(&headers);
        assert_eq!(hints.city.as_deref(), Some("Lyon"));
        assert_eq!(hints.latitude, None);

        let prompt = system_prompt(&hints);
        assert!(prompt.contains("- city: Lyon"));
        assert!(prompt.contains("- country: FR"));
        assert!(!prompt.contains("- lat:"));
    }
}
