use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Singleton aggregate over all sessions.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStats {
    pub total_sessions: u64,
    pub longest_duration_seconds: i64,
    pub currently_present: bool,
}

/// Row counts reported by the status endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecordCounts {
    pub readings: u64,
    pub sessions: u64,
}

/// Counted session starts for one calendar day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: u64,
}
