use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::duration_seconds;
use crate::sensing::SmoothedState;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PresenceStatus {
    #[default]
    Absent,
    Present,
}

/// Which smoothed signals must be true to open a session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionGate {
    #[default]
    Presence,
    PresenceAndPlaying,
}

impl SessionGate {
    pub fn is_open(self, state: SmoothedState) -> bool {
        match self {
            SessionGate::Presence => state.presence,
            SessionGate::PresenceAndPlaying => state.presence && state.playing,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Minimum spacing between two counted session starts.
    pub cooldown: Duration,
    pub gate: SessionGate,
    /// Offset used to bucket session starts into calendar days.
    pub day_offset: FixedOffset,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::milliseconds(5000),
            gate: SessionGate::Presence,
            day_offset: Utc.fix(),
        }
    }
}

/// State change produced by [`SessionTracker::observe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Started {
        started_at: DateTime<Utc>,
        /// False when the start fell inside the cooldown.
        counted: bool,
        day: NaiveDate,
    },
    Ended {
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        duration_secs: i64,
        /// True when this session beat the longest-duration record.
        new_record: bool,
    },
}

/// Absent/present state machine over smoothed readings.
///
/// Keeps the in-memory counters that back the session statistics; the store
/// is updated from the transitions it returns.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    config: TrackerConfig,
    status: PresenceStatus,
    session_start: Option<DateTime<Utc>>,
    last_counted_start: Option<DateTime<Utc>>,
    total_sessions: u64,
    longest_duration_secs: i64,
}

impl SessionTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            status: PresenceStatus::Absent,
            session_start: None,
            last_counted_start: None,
            total_sessions: 0,
            longest_duration_secs: 0,
        }
    }

    pub fn status(&self) -> PresenceStatus {
        self.status
    }

    pub fn session_start(&self) -> Option<DateTime<Utc>> {
        self.session_start
    }

    pub fn total_sessions(&self) -> u64 {
        self.total_sessions
    }

    pub fn longest_duration_secs(&self) -> i64 {
        self.longest_duration_secs
    }

    pub fn day_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.config.day_offset).date_naive()
    }

    /// Merges counters loaded from the store, never lowering either one.
    pub fn restore(&mut self, total_sessions: u64, longest_duration_secs: i64) {
        self.total_sessions = self.total_sessions.max(total_sessions);
        self.longest_duration_secs = self.longest_duration_secs.max(longest_duration_secs);
    }

    pub fn observe(&mut self, state: SmoothedState, now: DateTime<Utc>) -> Option<Transition> {
        match self.status {
            PresenceStatus::Absent if self.config.gate.is_open(state) => Some(self.start(now)),
            PresenceStatus::Present if !state.presence => self.end(now),
            _ => None,
        }
    }

    fn start(&mut self, now: DateTime<Utc>) -> Transition {
        let counted = match self.last_counted_start {
            Some(last) => now - last >= self.config.cooldown,
            None => true,
        };
        if counted {
            self.last_counted_start = Some(now);
            self.total_sessions += 1;
        }

        self.status = PresenceStatus::Present;
        self.session_start = Some(now);

        Transition::Started {
            started_at: now,
            counted,
            day: self.day_of(now),
        }
    }

    fn end(&mut self, now: DateTime<Utc>) -> Option<Transition> {
        self.status = PresenceStatus::Absent;
        let started_at = self.session_start.take()?;

        let duration_secs = duration_seconds(started_at, now);
        let new_record = duration_secs > self.longest_duration_secs;
        if new_record {
            self.longest_duration_secs = duration_secs;
        }

        Some(Transition::Ended {
            started_at,
            ended_at: now,
            duration_secs,
            new_record,
        })
    }
}
