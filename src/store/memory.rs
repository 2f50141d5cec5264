use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::error;

use crate::db::{
    models::duration_seconds, DailyCount, GlobalStats, RecordCounts, Sample, Session, SessionId,
};

use super::{AggregationStore, StoreError, StoreResult};

/// Bounds for the in-memory backend.
#[derive(Debug, Clone)]
pub struct MemoryLimits {
    pub sample_capacity: usize,
    /// Samples older than the newest one by more than this are evicted.
    pub retention: Duration,
    pub session_capacity: usize,
}

impl Default for MemoryLimits {
    fn default() -> Self {
        Self {
            sample_capacity: 1000,
            retention: Duration::hours(24),
            session_capacity: 1000,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    samples: VecDeque<Sample>,
    sessions: VecDeque<Session>,
    next_sample_id: i64,
    next_session_id: SessionId,
    total_sessions: u64,
    longest_duration_secs: i64,
    daily: BTreeMap<NaiveDate, u64>,
}

impl MemoryState {
    fn close_open(&mut self, end: DateTime<Utc>) -> usize {
        let mut closed = 0;
        for session in self.sessions.iter_mut().filter(|s| s.is_open()) {
            let duration = duration_seconds(session.start_time, end);
            session.close(end, duration);
            closed += 1;
        }
        closed
    }
}

/// Bounded rolling store kept entirely in process memory.
///
/// Used on its own when no database is configured and as the mirror behind
/// [`FallbackStore`](super::FallbackStore).
#[derive(Debug)]
pub struct MemoryStore {
    limits: MemoryLimits,
    state: Mutex<MemoryState>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(MemoryLimits::default())
    }
}

impl MemoryStore {
    pub fn new(limits: MemoryLimits) -> Self {
        Self {
            limits: MemoryLimits {
                sample_capacity: limits.sample_capacity.max(1),
                session_capacity: limits.session_capacity.max(1),
                ..limits
            },
            state: Mutex::new(MemoryState {
                next_sample_id: 1,
                next_session_id: 1,
                ..MemoryState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Raises the counters to at least the given values.
    pub fn seed_counters(&self, total_sessions: u64, longest_duration_secs: i64) {
        let mut state = self.lock();
        state.total_sessions = state.total_sessions.max(total_sessions);
        state.longest_duration_secs = state.longest_duration_secs.max(longest_duration_secs);
    }
}

#[async_trait]
impl AggregationStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn append_sample(&self, mut sample: Sample) -> StoreResult<Sample> {
        let mut state = self.lock();
        sample.id = Some(state.next_sample_id);
        state.next_sample_id += 1;

        let cutoff = sample.timestamp - self.limits.retention;
        while state
            .samples
            .front()
            .is_some_and(|oldest| oldest.timestamp < cutoff)
        {
            state.samples.pop_front();
        }
        if state.samples.len() >= self.limits.sample_capacity {
            state.samples.pop_front();
        }
        state.samples.push_back(sample.clone());
        Ok(sample)
    }

    async fn open_session(&self, start: DateTime<Utc>) -> StoreResult<SessionId> {
        let mut state = self.lock();
        let stale = state.close_open(start);
        if stale > 0 {
            error!(
                "{}",
                StoreError::InvariantViolation(format!(
                    "{stale} session(s) still open at {start}, closed before opening a new one"
                ))
            );
        }

        let id = state.next_session_id;
        state.next_session_id += 1;
        if state.sessions.len() >= self.limits.session_capacity {
            if let Some(pos) = state.sessions.iter().position(|s| !s.is_open()) {
                state.sessions.remove(pos);
            }
        }
        state.sessions.push_back(Session::open(id, start));
        Ok(id)
    }

    async fn close_session(
        &self,
        id: SessionId,
        end: DateTime<Utc>,
        duration_secs: i64,
    ) -> StoreResult<()> {
        let mut state = self.lock();
        let session = state
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StoreError::SessionNotFound(id))?;
        session.close(end, duration_secs);
        Ok(())
    }

    async fn close_open_sessions(&self, end: DateTime<Utc>) -> StoreResult<usize> {
        Ok(self.lock().close_open(end))
    }

    async fn count_session_start(&self, day: NaiveDate) -> StoreResult<()> {
        let mut state = self.lock();
        state.total_sessions += 1;
        *state.daily.entry(day).or_insert(0) += 1;
        Ok(())
    }

    async fn record_longest(&self, duration_secs: i64) -> StoreResult<()> {
        let mut state = self.lock();
        state.longest_duration_secs = state.longest_duration_secs.max(duration_secs);
        Ok(())
    }

    async fn samples_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<Sample>> {
        let state = self.lock();
        let samples = state
            .samples
            .iter()
            .filter(|s| s.timestamp >= since)
            .cloned()
            .collect();
        Ok(samples)
    }

    async fn sessions_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<Session>> {
        let state = self.lock();
        let mut sessions: Vec<Session> = state
            .sessions
            .iter()
            .filter(|s| !s.is_open() && s.start_time >= since)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| (s.start_time, s.id));
        Ok(sessions)
    }

    async fn latest_sample(&self) -> StoreResult<Option<Sample>> {
        Ok(self.lock().samples.back().cloned())
    }

    async fn global_stats(&self) -> StoreResult<GlobalStats> {
        let state = self.lock();
        Ok(GlobalStats {
            total_sessions: state.total_sessions,
            longest_duration_seconds: state.longest_duration_secs,
            currently_present: state.sessions.iter().any(Session::is_open),
        })
    }

    async fn daily_counts(&self, since: NaiveDate) -> StoreResult<Vec<DailyCount>> {
        let state = self.lock();
        let counts = state
            .daily
            .range(since..)
            .map(|(date, count)| DailyCount {
                date: *date,
                count: *count,
            })
            .collect();
        Ok(counts)
    }

    async fn record_counts(&self) -> StoreResult<RecordCounts> {
        let state = self.lock();
        Ok(RecordCounts {
            readings: state.samples.len() as u64,
            sessions: state.sessions.len() as u64,
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn sample_buffer_is_capped() {
        let store = MemoryStore::new(MemoryLimits {
            sample_capacity: 3,
            ..MemoryLimits::default()
        });
        for i in 0..5 {
            store
                .append_sample(Sample::new(t0() + Duration::seconds(i), 100 + i, 0))
                .await
                .unwrap();
        }

        let samples = store.samples_since(t0()).await.unwrap();
        let distances: Vec<i64> = samples.iter().map(|s| s.distance).collect();
        assert_eq!(distances, vec![102, 103, 104]);
        assert_eq!(samples[2].id, Some(5));
    }

    #[tokio::test]
    async fn samples_past_retention_are_evicted() {
        let store = MemoryStore::default();
        store.append_sample(Sample::new(t0(), 1, 0)).await.unwrap();
        store
            .append_sample(Sample::new(t0() + Duration::hours(25), 2, 0))
            .await
            .unwrap();

        let samples = store
            .samples_since(t0() - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].distance, 2);
    }

    #[tokio::test]
    async fn at_most_one_session_stays_open() {
        let store = MemoryStore::default();
        let first = store.open_session(t0()).await.unwrap();
        let second = store
            .open_session(t0() + Duration::seconds(20))
            .await
            .unwrap();
        assert_ne!(first, second);

        let closed = store.sessions_since(t0()).await.unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].id, first);
        assert_eq!(closed[0].duration_seconds, Some(20));
        assert!(store.global_stats().await.unwrap().currently_present);

        assert_eq!(
            store
                .close_open_sessions(t0() + Duration::seconds(30))
                .await
                .unwrap(),
            1
        );
        assert!(!store.global_stats().await.unwrap().currently_present);
    }

    #[tokio::test]
    async fn closing_unknown_session_is_an_error() {
        let store = MemoryStore::default();
        let err = store.close_session(9, t0(), 0).await.unwrap_err();
        assert!(matches!(err, StoreError::SessionNotFound(9)));
    }

    #[tokio::test]
    async fn counters_and_daily_buckets() {
        let store = MemoryStore::default();
        let day = |d| NaiveDate::from_ymd_opt(2025, 8, d).unwrap();
        store.count_session_start(day(1)).await.unwrap();
        store.count_session_start(day(3)).await.unwrap();
        store.count_session_start(day(3)).await.unwrap();
        store.record_longest(50).await.unwrap();
        store.record_longest(20).await.unwrap();

        let stats = store.global_stats().await.unwrap();
        assert_eq!(stats.total_sessions, 3);
        assert_eq!(stats.longest_duration_seconds, 50);

        let counts = store.daily_counts(day(2)).await.unwrap();
        assert_eq!(counts, vec![DailyCount { date: day(3), count: 2 }]);

        store.seed_counters(1, 90);
        let stats = store.global_stats().await.unwrap();
        assert_eq!(stats.total_sessions, 3);
        assert_eq!(stats.longest_duration_seconds, 90);
    }
}
