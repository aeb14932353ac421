// ABOUTME: JWT-based session authentication for chat requests
// ABOUTME: Issues and validates HS256 session tokens and resolves the caller's session
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Authentication and Session Resolution
//!
//! Session issuance belongs to an external identity service; this module only
//! needs to mint tokens for tooling and tests and to validate the tokens that
//! arrive on requests. A token is read from the `Authorization: Bearer` header
//! first and from the `auth_token` cookie otherwise.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use http::{header, HeaderMap};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::auth::AUTH_COOKIE_NAME;
use crate::errors::{AppError, AppResult};
use crate::models::UserTier;

/// `JWT` claims for a chat session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// User `ID`
    pub sub: String,
    /// Plan tier used for the turn quota
    pub tier: UserTier,
    /// Issued at timestamp (milliseconds, unique per manager)
    pub iat: i64,
    /// Expiration timestamp (seconds)
    pub exp: i64,
}

/// Resolved caller identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Authenticated user `ID`
    pub user_id: String,
    /// Plan tier
    pub tier: UserTier,
}

/// Authentication manager for `JWT` session tokens
pub struct AuthManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_expiry_hours: i64,
    /// Monotonic counter to ensure unique issued-at values
    token_counter: AtomicU64,
}

impl AuthManager {
    /// Create a new authentication manager from an HMAC secret
    #[must_use]
    pub fn new(secret: &[u8], token_expiry_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            token_expiry_hours,
            token_counter: AtomicU64::new(0),
        }
    }

    /// Generate a session token
    ///
    /// # Errors
    ///
    /// Returns an error if JWT encoding fails
    pub fn generate_token(&self, user_id: &str, tier: UserTier) -> Result<String> {
        let now = Utc::now();
        let expiry = now + Duration::hours(self.token_expiry_hours);

        let counter = self.token_counter.fetch_add(1, Ordering::Relaxed);
        let unique_iat =
            now.timestamp() * 1000 + i64::from(u32::try_from(counter % 1000).unwrap_or(0));

        let claims = Claims {
            sub: user_id.to_owned(),
            tier,
            iat: unique_iat,
            exp: expiry.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow!("Failed to encode session token: {e}"))
    }

    /// Validate a session token and return its claims
    ///
    /// # Errors
    ///
    /// Returns an error if the signature is invalid, the token is expired or malformed
    pub fn validate_token(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Session token rejected: {e}");
                AppError::auth_invalid(format!("Invalid session token: {e}"))
            })
    }

    /// Resolve the caller's session from request headers
    ///
    /// Returns `None` when no token is presented or the token does not validate.
    #[must_use]
    pub fn current_session(&self, headers: &HeaderMap) -> Option<Session> {
        let token = bearer_token(headers).or_else(|| cookie_value(headers, AUTH_COOKIE_NAME))?;
        let claims = self.validate_token(&token).ok()?;
        Some(Session {
            user_id: claims.sub,
            tier: claims.tier,
        })
    }
}

/// Extract the token from an `Authorization: Bearer` header
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_owned())
        .filter(|token| !token.is_empty())
}

/// Extract a cookie value by name
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_owned())
        .filter(|value| !value.is_empty())
}

/// Generate a random `JWT` secret
///
/// # Errors
///
/// Returns an error if the system RNG fails
pub fn generate_jwt_secret() -> Result<[u8; 64]> {
    use ring::rand::{SecureRandom, SystemRandom};

    let rng = SystemRandom::new();
    let mut secret = [0u8; 64];

    rng.fill(&mut secret).map_err(|e| {
        tracing::error!("Failed to generate JWT secret: {}", e);
        anyhow!("System RNG failure - cannot generate secure JWT secret")
    })?;

    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn manager() -> AuthManager {
        AuthManager::new(&generate_jwt_secret().unwrap(), 24)
    }

    #[test]
    fn test_token_round_trip() {
        let auth = manager();
        let token = auth.generate_token("user-1", UserTier::Professional).unwrap();
        let claims = auth.validate_token(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.tier, UserTier::Professional);
    }

    #[test]
    fn test_token_from_other_secret_is_rejected() {
        let token = manager().generate_token("user-1", UserTier::Starter).unwrap();
        assert!(manager().validate_token(&token).is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let auth = AuthManager::new(b"secret", -1);
        let token = auth.generate_token("user-1", UserTier::Starter).unwrap();
        assert!(auth.validate_token(&token).is_err());
    }

    #[test]
    fn test_session_from_bearer_header() {
        let auth = manager();
        let token = auth.generate_token("user-1", UserTier::Starter).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );

        let session = auth.current_session(&headers).unwrap();
        assert_eq!(session.user_id, "user-1");
        assert_eq!(session.tier, UserTier::Starter);
    }

    #[test]
    fn test_session_from_cookie() {
        let auth = manager();
        let token = auth.generate_token("user-2", UserTier::Enterprise).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; auth_token={token}")).unwrap(),
        );

        let session = auth.current_session(&headers).unwrap();
        assert_eq!(session.user_id, "user-2");
    }

    #[test]
    fn test_no_session_without_token() {
        assert!(manager().current_session(&HeaderMap::new()).is_none());
    }
}
