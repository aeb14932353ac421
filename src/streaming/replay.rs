// ABOUTME: Bounded replay fallback used when a conversation's latest producer is gone
// ABOUTME: Replays the last assistant turn as one full-message event while it is fresh
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::events::StreamEvent;
use crate::models::{Role, Turn};

/// Result of the replay fallback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// Nothing to replay; the stream ends immediately
    Empty,
    /// Replay this turn as a single full-message replacement
    Message(Turn),
}

impl ReplayOutcome {
    /// Events making up the replayed stream
    #[must_use]
    pub fn into_events(self) -> Vec<StreamEvent> {
        match self {
            Self::Empty => Vec::new(),
            Self::Message(turn) => vec![StreamEvent::MessageReplace { message: turn }],
        }
    }
}

/// Decide what to replay given the conversation's most recent turn
///
/// Only an assistant turn no older than `window` is replayed; a turn exactly
/// `window` old still counts. A creation time in the future (clock skew) is
/// treated as fresh.
#[must_use]
pub fn replay_from_last_turn(
    last: Option<&Turn>,
    now: DateTime<Utc>,
    window: Duration,
) -> ReplayOutcome {
    let Some(turn) = last.filter(|turn| turn.role == Role::Assistant) else {
        return ReplayOutcome::Empty;
    };

    let fresh = (now - turn.created_at)
        .to_std()
        .map_or(true, |elapsed| elapsed <= window);

    if fresh {
        ReplayOutcome::Message(turn.clone())
    } else {
        ReplayOutcome::Empty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    use crate::models::Part;

    const WINDOW: Duration = Duration::from_secs(15);

    fn turn(role: Role, created_at: DateTime<Utc>) -> Turn {
        Turn {
            id: "t1".to_owned(),
            conversation_id: "c1".to_owned(),
            role,
            parts: vec![Part::text("answer")],
            attachments: Vec::new(),
            created_at,
        }
    }

    #[test]
    fn test_replays_within_window() {
        let now = Utc::now();
        let last = turn(Role::Assistant, now - ChronoDuration::seconds(14));
        assert_eq!(
            replay_from_last_turn(Some(&last), now, WINDOW),
            ReplayOutcome::Message(last.clone())
        );
    }

    #[test]
    fn test_exact_boundary_replays() {
        let now = Utc::now();
        let last = turn(Role::Assistant, now - ChronoDuration::seconds(15));
        assert!(matches!(
            replay_from_last_turn(Some(&last), now, WINDOW),
            ReplayOutcome::Message(_)
        ));
    }

    #[test]
    fn test_stale_turn_is_not_replayed() {
        let now = Utc::now();
        let last = turn(Role::Assistant, now - ChronoDuration::seconds(16));
        assert_eq!(
            replay_from_last_turn(Some(&last), now, WINDOW),
            ReplayOutcome::Empty
        );
    }

    #[test]
    fn test_non_assistant_turn_is_not_replayed() {
        let now = Utc::now();
        let last = turn(Role::User, now);
        assert_eq!(
            replay_from_last_turn(Some(&last), now, WINDOW),
            ReplayOutcome::Empty
        );
        assert_eq!(replay_from_last_turn(None, now, WINDOW), ReplayOutcome::Empty);
    }

    #[test]
    fn test_future_timestamp_counts_as_fresh() {
        let now = Utc::now();
        let last = turn(Role::Assistant, now + ChronoDuration::seconds(3));
        assert!(matches!(
            replay_from_last_turn(Some(&last), now, WINDOW),
            ReplayOutcome::Message(_)
        ));
    }

    #[test]
    fn test_replay_is_deterministic() {
        let now = Utc::now();
        let last = turn(Role::Assistant, now);
        let first = replay_from_last_turn(Some(&last), now, WINDOW).into_events();
        let second = replay_from_last_turn(Some(&last), now, WINDOW).into_events();
        assert_eq!(
            first[0].to_sse_data().unwrap(),
            second[0].to_sse_data().unwrap()
        );
    }
}
