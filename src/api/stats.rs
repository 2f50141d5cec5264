use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::{db::DailyCount, state::AppState, tracker::PresenceStatus};

use super::{error::ApiResult, readings::ReadingView};

/// Days covered by `dailyCounts`, today included.
const DAILY_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub daily_counts: Vec<DailyCount>,
    pub longest_duration: i64,
    pub total_players: u64,
    pub current_presence: bool,
    pub latest_reading: Option<ReadingView>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub today_count: usize,
    pub avg_duration: f64,
    pub max_duration: i64,
    pub timestamp: DateTime<Utc>,
}

/// GET /api/stats - Dashboard counters.
///
/// Stored counters are merged with the live tracker so a degraded store never
/// reports less than the running process has seen.
pub async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatsResponse>> {
    let today = Utc::now()
        .with_timezone(&state.settings.day_offset())
        .date_naive();
    let since = today - Duration::days(DAILY_WINDOW_DAYS - 1);

    let daily_counts = state.store.daily_counts(since).await?;
    let stats = state.store.global_stats().await?;
    let latest = state.store.latest_sample().await?;
    let live = state.live();

    Ok(Json(StatsResponse {
        daily_counts,
        longest_duration: stats.longest_duration_seconds.max(live.longest_duration_secs),
        total_players: stats.total_sessions.max(live.total_sessions),
        current_presence: stats.currently_present || live.status == PresenceStatus::Present,
        latest_reading: latest.map(|sample| ReadingView::new(sample, &state.settings)),
    }))
}

/// GET /api/summary - Sessions started in the last 24 hours.
///
/// An open session counts toward `todayCount` but not the durations.
pub async fn get_summary(State(state): State<Arc<AppState>>) -> ApiResult<Json<SummaryResponse>> {
    let now = Utc::now();
    let since = now - Duration::hours(24);
    let closed = state.store.sessions_since(since).await?;

    let open_in_window = state
        .live()
        .session_started_at
        .is_some_and(|started| started >= since);

    let durations: Vec<i64> = closed.iter().filter_map(|s| s.duration_seconds).collect();
    let avg_duration = if durations.is_empty() {
        0.0
    } else {
        durations.iter().sum::<i64>() as f64 / durations.len() as f64
    };

    Ok(Json(SummaryResponse {
        today_count: closed.len() + usize::from(open_in_window),
        avg_duration,
        max_duration: durations.iter().copied().max().unwrap_or(0),
        timestamp: now,
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/summary", get(get_summary))
}
