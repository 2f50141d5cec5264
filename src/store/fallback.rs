use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use log::{info, warn};

use crate::db::{DailyCount, GlobalStats, RecordCounts, Sample, Session, SessionId};

use super::{AggregationStore, MemoryStore, StoreError, StoreResult};

/// Wraps a primary backend with an in-memory mirror.
///
/// Every write lands in the mirror first. A failing primary is marked
/// unavailable and reads are served from the mirror until [`ping`] reaches the
/// primary again. Session ids handed out are mirror ids; the matching primary
/// ids are tracked so closes reach the right row. Closes that miss the
/// primary are queued and replayed, in order, before it is marked up again.
///
/// [`ping`]: AggregationStore::ping
pub struct FallbackStore {
    primary: Arc<dyn AggregationStore>,
    mirror: MemoryStore,
    primary_up: AtomicBool,
    session_ids: Mutex<HashMap<SessionId, SessionId>>,
    pending_closes: Mutex<Vec<PendingClose>>,
}

/// A close the primary has not seen yet. Without a primary id the primary's
/// open rows are swept at `end`.
#[derive(Debug, Clone)]
struct PendingClose {
    primary_id: Option<SessionId>,
    end: DateTime<Utc>,
    duration_secs: i64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl FallbackStore {
    pub fn new(primary: Arc<dyn AggregationStore>, mirror: MemoryStore) -> Self {
        Self {
            primary,
            mirror,
            primary_up: AtomicBool::new(true),
            session_ids: Mutex::new(HashMap::new()),
            pending_closes: Mutex::new(Vec::new()),
        }
    }

    fn primary_up(&self) -> bool {
        self.primary_up.load(Ordering::SeqCst)
    }

    fn mark_down(&self, op: &str, err: &StoreError) {
        if self.primary_up.swap(false, Ordering::SeqCst) {
            warn!(
                "{} backend failed during {op}, serving from memory: {err}",
                self.primary.backend_name()
            );
        }
    }

    fn mark_up(&self) {
        if !self.primary_up.swap(true, Ordering::SeqCst) {
            info!("{} backend reachable again", self.primary.backend_name());
        }
    }

    /// Runs a write against the primary, logging instead of failing.
    fn absorb<T>(&self, op: &str, result: StoreResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err @ StoreError::Unavailable(_)) => {
                self.mark_down(op, &err);
                None
            }
            Err(err) => {
                warn!("{} backend rejected {op}: {err}", self.primary.backend_name());
                None
            }
        }
    }

    /// Result of a primary read, or `None` when the mirror should answer.
    fn read<T>(&self, op: &str, result: StoreResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.mark_down(op, &err);
                None
            }
        }
    }

    fn map_session(&self, mirror_id: SessionId, primary_id: SessionId) {
        lock(&self.session_ids).insert(mirror_id, primary_id);
    }

    fn take_session(&self, mirror_id: SessionId) -> Option<SessionId> {
        lock(&self.session_ids).remove(&mirror_id)
    }

    fn clear_sessions(&self) {
        lock(&self.session_ids).clear();
    }

    fn defer_close(&self, close: PendingClose) {
        lock(&self.pending_closes).push(close);
    }

    async fn apply_close(&self, close: &PendingClose) -> StoreResult<()> {
        match close.primary_id {
            Some(primary_id) => {
                self.primary
                    .close_session(primary_id, close.end, close.duration_secs)
                    .await
            }
            None => self.primary.close_open_sessions(close.end).await.map(|_| ()),
        }
    }

    /// Sends a close to the primary, queueing it when the primary is down.
    async fn forward_close(&self, op: &str, close: PendingClose) {
        if !self.primary_up() {
            self.defer_close(close);
            return;
        }
        match self.apply_close(&close).await {
            Ok(()) => {}
            Err(err @ StoreError::Unavailable(_)) => {
                self.mark_down(op, &err);
                self.defer_close(close);
            }
            Err(err) => {
                warn!("{} backend rejected {op}: {err}", self.primary.backend_name());
            }
        }
    }

    /// Replays queued closes oldest first. Stops at the first outage and
    /// keeps the rest queued.
    async fn replay_pending_closes(&self) -> StoreResult<()> {
        let pending = std::mem::take(&mut *lock(&self.pending_closes));
        if pending.is_empty() {
            return Ok(());
        }
        info!(
            "replaying {} deferred session close(s) on the {} backend",
            pending.len(),
            self.primary.backend_name()
        );

        let mut queue = pending.into_iter();
        while let Some(close) = queue.next() {
            match self.apply_close(&close).await {
                Ok(()) => {}
                Err(err @ StoreError::Unavailable(_)) => {
                    let mut remaining: Vec<PendingClose> =
                        std::iter::once(close).chain(queue).collect();
                    let mut guard = lock(&self.pending_closes);
                    remaining.append(&mut guard);
                    *guard = remaining;
                    return Err(err);
                }
                Err(err) => {
                    warn!("dropping deferred close {close:?}: {err}");
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AggregationStore for FallbackStore {
    fn backend_name(&self) -> &'static str {
        self.primary.backend_name()
    }

    fn is_available(&self) -> bool {
        self.primary_up()
    }

    async fn append_sample(&self, sample: Sample) -> StoreResult<Sample> {
        let mirrored = self.mirror.append_sample(sample.clone()).await?;
        if !self.primary_up() {
            return Ok(mirrored);
        }
        let stored = self.absorb("append_sample", self.primary.append_sample(sample).await);
        Ok(stored.unwrap_or(mirrored))
    }

    async fn open_session(&self, start: DateTime<Utc>) -> StoreResult<SessionId> {
        let mirror_id = self.mirror.open_session(start).await?;
        if self.primary_up() {
            if let Some(primary_id) =
                self.absorb("open_session", self.primary.open_session(start).await)
            {
                self.map_session(mirror_id, primary_id);
            }
        }
        Ok(mirror_id)
    }

    async fn close_session(
        &self,
        id: SessionId,
        end: DateTime<Utc>,
        duration_secs: i64,
    ) -> StoreResult<()> {
        self.mirror.close_session(id, end, duration_secs).await?;
        let close = PendingClose {
            primary_id: self.take_session(id),
            end,
            duration_secs,
        };
        self.forward_close("close_session", close).await;
        Ok(())
    }

    async fn close_open_sessions(&self, end: DateTime<Utc>) -> StoreResult<usize> {
        let mirrored = self.mirror.close_open_sessions(end).await?;
        self.clear_sessions();
        let sweep = PendingClose {
            primary_id: None,
            end,
            duration_secs: 0,
        };
        if !self.primary_up() {
            self.defer_close(sweep);
            return Ok(mirrored);
        }
        match self.primary.close_open_sessions(end).await {
            Ok(closed) => Ok(closed),
            Err(err @ StoreError::Unavailable(_)) => {
                self.mark_down("close_open_sessions", &err);
                self.defer_close(sweep);
                Ok(mirrored)
            }
            Err(err) => {
                warn!(
                    "{} backend rejected close_open_sessions: {err}",
                    self.primary.backend_name()
                );
                Ok(mirrored)
            }
        }
    }

    async fn count_session_start(&self, day: NaiveDate) -> StoreResult<()> {
        self.mirror.count_session_start(day).await?;
        if self.primary_up() {
            self.absorb(
                "count_session_start",
                self.primary.count_session_start(day).await,
            );
        }
        Ok(())
    }

    async fn record_longest(&self, duration_secs: i64) -> StoreResult<()> {
        self.mirror.record_longest(duration_secs).await?;
        if self.primary_up() {
            self.absorb(
                "record_longest",
                self.primary.record_longest(duration_secs).await,
            );
        }
        Ok(())
    }

    async fn samples_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<Sample>> {
        if self.primary_up() {
            if let Some(samples) = self.read("samples_since", self.primary.samples_since(since).await) {
                return Ok(samples);
            }
        }
        self.mirror.samples_since(since).await
    }

    async fn sessions_since(&self, since: DateTime<Utc>) -> StoreResult<Vec<Session>> {
        if self.primary_up() {
            if let Some(sessions) =
                self.read("sessions_since", self.primary.sessions_since(since).await)
            {
                return Ok(sessions);
            }
        }
        self.mirror.sessions_since(since).await
    }

    async fn latest_sample(&self) -> StoreResult<Option<Sample>> {
        if self.primary_up() {
            if let Some(sample) = self.read("latest_sample", self.primary.latest_sample().await) {
                return Ok(sample);
            }
        }
        self.mirror.latest_sample().await
    }

    async fn global_stats(&self) -> StoreResult<GlobalStats> {
        if self.primary_up() {
            if let Some(stats) = self.read("global_stats", self.primary.global_stats().await) {
                self.mirror
                    .seed_counters(stats.total_sessions, stats.longest_duration_seconds);
                return Ok(stats);
            }
        }
        self.mirror.global_stats().await
    }

    async fn daily_counts(&self, since: NaiveDate) -> StoreResult<Vec<DailyCount>> {
        if self.primary_up() {
            if let Some(counts) = self.read("daily_counts", self.primary.daily_counts(since).await) {
                return Ok(counts);
            }
        }
        self.mirror.daily_counts(since).await
    }

    async fn record_counts(&self) -> StoreResult<RecordCounts> {
        if self.primary_up() {
            if let Some(counts) = self.read("record_counts", self.primary.record_counts().await) {
                return Ok(counts);
            }
        }
        self.mirror.record_counts().await
    }

    async fn ping(&self) -> StoreResult<()> {
        let result = match self.primary.ping().await {
            Ok(()) => self.replay_pending_closes().await,
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => {
                self.mark_up();
                Ok(())
            }
            Err(err) => {
                self.mark_down("ping", &err);
                Err(err)
            }
        }
    }
}
