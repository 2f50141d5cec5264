use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use log::error;

use crate::db::{Database, DailyCount, GlobalStats, RecordCounts, Sample, Session, SessionId};

use super::{AggregationStore, StoreError, StoreResult};

/// [`AggregationStore`] backed by the SQLite worker thread.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AggregationStore for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn append_sample(&self, mut sample: Sample) -> StoreResult<Sample> {
        let id = self.db.insert_reading(&sample).await?;
        sample.id = Some(id);
        Ok(sample)
    }

    async fn open_session(&self, start: DateTime<Utc>) -> StoreResult<SessionId> {
        let opened = self.db.open_session(start).await?;
        if !opened.closed.is_empty() {
            let ids: Vec<SessionId> = opened.closed.iter().map(|s| s.id).collect();
            error!(
                "{}",
                StoreError::InvariantViolation(format!(
                    "sessions {ids:?} were still open at {start}, closed before opening {}",
                    opened.id
                ))
            );
        }
        Ok(opened.id)
    }

    async fn close_session(
        &self,
        id: SessionId,
        end: DateTime<Utc>,
        duration_secs: i64,
    ) -> StoreResult<()> {
        if self.db.close_session(id, end, duration_secs).await? {
            Ok(())
        } else {
            Err(StoreError::SessionNotFound(id))
        }
    }

    async fn close_open_sessions(&self, end: DateTime<Utc>) -> StoreResult<usize> {
        Ok(self.db.close_open_sessions(end).await?.len())
    }

    async fn count_session_start(&self, day: NaiveDate) -> StoreResult<()> {
        Ok(self.db.increment_session_count(day).await?)
    }

    async fn record_longest(&self, duration_secs: i64) -> StoreResult<()> {
        Ok(self.db.raise_longest_duration(duration_secs).await?)
    }

    async fn samples_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<Sample>> {
        Ok(self.db.get_readings_since(since).await?)
    }

    async fn sessions_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<Session>> {
        Ok(self.db.get_closed_sessions_since(since).await?)
    }

    async fn latest_sample(&self) -> StoreResult<Option<Sample>> {
        Ok(self.db.latest_reading().await?)
    }

    async fn global_stats(&self) -> StoreResult<GlobalStats> {
        Ok(self.db.get_global_stats().await?)
    }

    async fn daily_counts(&self, since: NaiveDate) -> StoreResult<Vec<DailyCount>> {
        Ok(self.db.get_daily_counts(since).await?)
    }

    async fn record_counts(&self) -> StoreResult<RecordCounts> {
        Ok(self.db.count_records().await?)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(self.db.ping().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[tokio::test]
    async fn unknown_session_maps_to_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(Database::new(dir.path().join("store.sqlite3")).unwrap());
        let now = Utc.with_ymd_and_hms(2025, 8, 1, 12, 0, 0).unwrap();

        let err = store.close_session(77, now, 3).await.unwrap_err();
        assert!(matches!(err, StoreError::SessionNotFound(77)));

        let id = store.open_session(now).await.unwrap();
        store
            .close_session(id, now + Duration::seconds(3), 3)
            .await
            .unwrap();
        assert_eq!(store.sessions_since(now).await.unwrap().len(), 1);

        let sample = store.append_sample(Sample::new(now, 120, 170)).await.unwrap();
        assert!(sample.id.is_some());
        assert_eq!(store.latest_sample().await.unwrap(), Some(sample));
        store.ping().await.unwrap();
    }
}
