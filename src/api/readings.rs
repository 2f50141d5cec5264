use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db::Sample,
    ingest::ingest_json,
    settings::MonitorSettings,
    state::AppState,
    tracker::PresenceStatus,
};

use super::error::{ApiError, ApiResult};

const DEFAULT_HOURS: i64 = 24;
const MAX_HOURS: i64 = 24 * 366;

#[derive(Debug, Deserialize, Default)]
pub struct ReadingsQuery {
    pub hours: Option<i64>,
}

/// A stored sample with its 0-100 proximity.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub struct ReadingView {
    #[serde(flatten)]
    pub sample: Sample,
    pub proximity: f64,
}

impl ReadingView {
    pub fn new(sample: Sample, settings: &MonitorSettings) -> Self {
        let proximity = sample.proximity(settings.distance_threshold, settings.proximity_scale());
        Self { sample, proximity }
    }
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub success: bool,
    pub presence: bool,
    pub playing: bool,
    pub status: PresenceStatus,
    pub session_started_at: Option<chrono::DateTime<Utc>>,
}

/// GET /api/readings?hours=N - Samples from the last N hours, oldest first.
pub async fn list_readings(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ReadingsQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<ReadingView>>> {
    let Query(query) = query?;
    let hours = query.hours.unwrap_or(DEFAULT_HOURS);
    if !(1..=MAX_HOURS).contains(&hours) {
        return Err(ApiError::BadRequest(format!(
            "hours must be between 1 and {MAX_HOURS}"
        )));
    }

    let since = Utc::now() - Duration::hours(hours);
    let readings = state
        .store
        .samples_since(since)
        .await?
        .into_iter()
        .map(|sample| ReadingView::new(sample, &state.settings))
        .collect();
    Ok(Json(readings))
}

/// POST /api/readings - Runs one reading through the monitor.
///
/// Body: `{"distance": 180, "volume": 170, "note": "C", "octave": 4}`.
/// Responds with the smoothed state after the reading.
pub async fn create_reading(
    State(state): State<Arc<AppState>>,
    body: String,
) -> ApiResult<Json<IngestResponse>> {
    let reading = ingest_json(&body, Utc::now())?;
    let live = state.monitor.submit(reading).await?;
    Ok(Json(IngestResponse {
        success: true,
        presence: live.presence,
        playing: live.playing,
        status: live.status,
        session_started_at: live.session_started_at,
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/readings", get(list_readings).post(create_reading))
}
