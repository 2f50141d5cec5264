//! Persistence seam between the monitor loop and the query API.

mod fallback;
mod memory;
mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::db::{DailyCount, GlobalStats, RecordCounts, Sample, Session, SessionId};

pub use fallback::FallbackStore;
pub use memory::{MemoryLimits, MemoryStore};
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("session not found: {0}")]
    SessionNotFound(SessionId),
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        StoreError::Unavailable(format!("{err:#}"))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Samples, sessions and counters behind one async interface.
///
/// Implementations must keep at most one session open: `open_session` closes
/// any leftover open sessions (oldest first) before inserting the new one.
#[async_trait]
pub trait AggregationStore: Send + Sync {
    /// Short backend label for status output.
    fn backend_name(&self) -> &'static str;

    /// Whether the backend currently serves reads from its own storage.
    fn is_available(&self) -> bool {
        true
    }

    async fn append_sample(&self, sample: Sample) -> StoreResult<Sample>;

    async fn open_session(&self, start: DateTime<Utc>) -> StoreResult<SessionId>;

    async fn close_session(
        &self,
        id: SessionId,
        end: DateTime<Utc>,
        duration_secs: i64,
    ) -> StoreResult<()>;

    /// Closes every open session at `end` and returns how many were closed.
    async fn close_open_sessions(&self, end: DateTime<Utc>) -> StoreResult<usize>;

    async fn count_session_start(&self, day: NaiveDate) -> StoreResult<()>;

    async fn record_longest(&self, duration_secs: i64) -> StoreResult<()>;

    async fn samples_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<Sample>>;

    /// Closed sessions that started at or after `since`, oldest first.
    async fn sessions_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<Session>>;

    async fn latest_sample(&self) -> StoreResult<Option<Sample>>;

    async fn global_stats(&self) -> StoreResult<GlobalStats>;

    async fn daily_counts(&self, since: NaiveDate) -> StoreResult<Vec<DailyCount>>;

    /// Stored readings and sessions, open ones included.
    async fn record_counts(&self) -> StoreResult<RecordCounts>;

    async fn ping(&self) -> StoreResult<()>;
}
