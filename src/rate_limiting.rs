// ABOUTME: Per-user turn quota evaluation over a trailing time window
// ABOUTME: Maps user tiers to turn allowances and reports remaining capacity
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Turn Quota
//!
//! A caller may submit a bounded number of user turns per trailing window.
//! Counting happens in the store; this module only turns a count into a
//! decision so the boundary can be tested without a database.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::QuotaConfig;
use crate::models::UserTier;

/// Quota decision for a single request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnQuotaInfo {
    /// Whether the request must be rejected
    pub is_rate_limited: bool,
    /// Maximum turns in the window, `None` when unlimited
    pub limit: Option<u32>,
    /// Remaining turns in the window, `None` when unlimited
    pub remaining: Option<u32>,
    /// Trailing window length in hours
    pub window_hours: u32,
    /// Tier the decision was made for
    pub tier: UserTier,
}

/// Evaluates turn counts against the configured per-tier allowance
#[derive(Debug, Clone, Copy)]
pub struct TurnQuotaPolicy {
    config: QuotaConfig,
}

impl TurnQuotaPolicy {
    /// Create a policy from quota configuration
    #[must_use]
    pub const fn new(config: QuotaConfig) -> Self {
        Self { config }
    }

    /// Allowance for `tier` within one window
    #[must_use]
    pub const fn max_turns(&self, tier: UserTier) -> Option<u32> {
        self.config.max_turns(tier)
    }

    /// Start of the trailing window ending at `now`
    #[must_use]
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::hours(i64::from(self.config.window_hours))
    }

    /// Decide whether a caller who already used `used` turns may submit another
    #[must_use]
    pub const fn evaluate(&self, tier: UserTier, used: u32) -> TurnQuotaInfo {
        let window_hours = self.config.window_hours;
        match self.config.max_turns(tier) {
            None => TurnQuotaInfo {
                is_rate_limited: false,
                limit: None,
                remaining: None,
                window_hours,
                tier,
            },
            Some(limit) => TurnQuotaInfo {
                is_rate_limited: used >= limit,
                limit: Some(limit),
                remaining: Some(limit.saturating_sub(used)),
                window_hours,
                tier,
            },
        }
    }
}
