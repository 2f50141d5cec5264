use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::watch;

use crate::{
    db::SessionId,
    ingest::IngestedReading,
    sensing::{SmoothedState, SmoothingFilter},
    settings::MonitorSettings,
    store::{AggregationStore, StoreError},
};

use super::{PresenceStatus, SessionTracker, Transition};

/// Snapshot published after every processed reading.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LiveState {
    pub presence: bool,
    pub playing: bool,
    pub status: PresenceStatus,
    pub session_started_at: Option<DateTime<Utc>>,
    pub last_sample_at: Option<DateTime<Utc>>,
    pub total_sessions: u64,
    pub longest_duration_secs: i64,
}

/// Owns the filter and tracker for one entity and writes their results
/// through to the store.
///
/// Store writes are best-effort: a failed write is logged and the in-memory
/// transition stands.
pub struct Monitor {
    settings: MonitorSettings,
    filter: SmoothingFilter,
    tracker: SessionTracker,
    store: Arc<dyn AggregationStore>,
    open_session: Option<SessionId>,
    last_sample_at: Option<DateTime<Utc>>,
    live: watch::Sender<LiveState>,
}

impl Monitor {
    pub fn new(
        settings: MonitorSettings,
        store: Arc<dyn AggregationStore>,
    ) -> (Self, watch::Receiver<LiveState>) {
        let (live, live_rx) = watch::channel(LiveState::default());
        let monitor = Self {
            filter: SmoothingFilter::new(settings.smoothing_config()),
            tracker: SessionTracker::new(settings.tracker_config()),
            settings,
            store,
            open_session: None,
            last_sample_at: None,
            live,
        };
        (monitor, live_rx)
    }

    pub fn entity(&self) -> &str {
        &self.settings.entity
    }

    pub fn store(&self) -> &Arc<dyn AggregationStore> {
        &self.store
    }

    /// Pulls the persisted counters into the tracker.
    pub async fn restore(&mut self) {
        match self.store.global_stats().await {
            Ok(stats) => {
                self.tracker
                    .restore(stats.total_sessions, stats.longest_duration_seconds);
                self.publish();
            }
            Err(err) => warn!("[{}] could not load stored stats: {err}", self.entity()),
        }
    }

    pub async fn handle_reading(&mut self, reading: IngestedReading) -> LiveState {
        let sample = reading.sample;
        let now = sample.timestamp;
        let raw_presence = reading
            .presence_hint
            .unwrap_or(sample.distance < self.settings.distance_threshold);

        let smoothed = self.filter.update(raw_presence, sample.volume);
        self.last_sample_at = Some(now);

        if smoothed.presence || !self.settings.persist_only_when_present {
            if let Err(err) = self.store.append_sample(sample).await {
                warn!("[{}] failed to store reading: {err}", self.entity());
            }
        }

        self.advance(smoothed, now).await
    }

    /// Feeds one synthetic absent, silent reading.
    pub async fn handle_absence_tick(&mut self, now: DateTime<Utc>) -> LiveState {
        let smoothed = self.filter.update(false, 0);
        self.advance(smoothed, now).await
    }

    async fn advance(&mut self, smoothed: SmoothedState, now: DateTime<Utc>) -> LiveState {
        if let Some(transition) = self.tracker.observe(smoothed, now) {
            self.persist(transition).await;
        }
        self.publish()
    }

    async fn persist(&mut self, transition: Transition) {
        match transition {
            Transition::Started {
                started_at,
                counted,
                day,
            } => {
                info!(
                    "[{}] session started at {started_at} (counted: {counted})",
                    self.entity()
                );
                self.open_session = match self.store.open_session(started_at).await {
                    Ok(id) => Some(id),
                    Err(err) => {
                        error!("[{}] failed to open session: {err}", self.entity());
                        None
                    }
                };
                if counted {
                    if let Err(err) = self.store.count_session_start(day).await {
                        error!("[{}] failed to count session start: {err}", self.entity());
                    }
                }
            }
            Transition::Ended {
                started_at,
                ended_at,
                duration_secs,
                new_record,
            } => {
                info!(
                    "[{}] session from {started_at} ended after {duration_secs}s",
                    self.entity()
                );
                self.close_session(ended_at, duration_secs).await;
                if new_record {
                    if let Err(err) = self.store.record_longest(duration_secs).await {
                        error!("[{}] failed to record longest session: {err}", self.entity());
                    }
                }
            }
        }
    }

    async fn close_session(&mut self, ended_at: DateTime<Utc>, duration_secs: i64) {
        let result = match self.open_session.take() {
            Some(id) => match self.store.close_session(id, ended_at, duration_secs).await {
                Err(StoreError::SessionNotFound(_)) => {
                    self.store.close_open_sessions(ended_at).await.map(|_| ())
                }
                other => other,
            },
            None => self.store.close_open_sessions(ended_at).await.map(|_| ()),
        };
        if let Err(err) = result {
            error!("[{}] failed to close session: {err}", self.entity());
        }
    }

    fn publish(&self) -> LiveState {
        let state = self.filter.state();
        let snapshot = LiveState {
            presence: state.presence,
            playing: state.playing,
            status: self.tracker.status(),
            session_started_at: self.tracker.session_start(),
            last_sample_at: self.last_sample_at,
            total_sessions: self.tracker.total_sessions(),
            longest_duration_secs: self.tracker.longest_duration_secs(),
        };
        self.live.send_replace(snapshot.clone());
        snapshot
    }
}
