//! Presence session data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type SessionId = i64;

/// A contiguous interval during which presence was detected.
///
/// `end_time` and `duration_seconds` stay `None` while the session is open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
}

impl Session {
    pub fn open(id: SessionId, start_time: DateTime<Utc>) -> Self {
        Self {
            id,
            start_time,
            end_time: None,
            duration_seconds: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    pub fn close(&mut self, end_time: DateTime<Utc>, duration_seconds: i64) {
        self.end_time = Some(end_time);
        self.duration_seconds = Some(duration_seconds);
    }
}

/// Whole seconds between two instants, floored and never negative.
pub fn duration_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_seconds().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn duration_is_floored_to_whole_seconds() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let end = start + Duration::milliseconds(61_999);
        assert_eq!(duration_seconds(start, end), 61);
    }

    #[test]
    fn duration_never_goes_negative() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(duration_seconds(start, start - Duration::seconds(3)), 0);
    }

    #[test]
    fn closing_sets_end_and_duration() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut session = Session::open(7, start);
        assert!(session.is_open());
        session.close(start + Duration::seconds(42), 42);
        assert!(!session.is_open());
        assert_eq!(session.duration_seconds, Some(42));
    }
}
