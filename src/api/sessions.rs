use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::Deserialize;

use crate::{db::Session, state::AppState};

use super::error::{ApiError, ApiResult};

const DEFAULT_DAYS: i64 = 7;
const MAX_DAYS: i64 = 366;

#[derive(Debug, Deserialize, Default)]
pub struct SessionsQuery {
    pub days: Option<i64>,
}

/// GET /api/sessions?days=N - Closed sessions started in the last N days.
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SessionsQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Session>>> {
    let Query(query) = query?;
    let days = query.days.unwrap_or(DEFAULT_DAYS);
    if !(1..=MAX_DAYS).contains(&days) {
        return Err(ApiError::BadRequest(format!(
            "days must be between 1 and {MAX_DAYS}"
        )));
    }

    let since = Utc::now() - Duration::days(days);
    Ok(Json(state.store.sessions_since(since).await?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/sessions", get(list_sessions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::*;
    use crate::store::AggregationStore;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn only_closed_sessions_in_window_are_listed() {
        let mut t = test_app();
        let now = Utc::now();

        let old = t.store.open_session(now - Duration::days(10)).await.unwrap();
        t.store
            .close_session(old, now - Duration::days(10) + Duration::seconds(5), 5)
            .await
            .unwrap();
        let recent = t.store.open_session(now - Duration::hours(2)).await.unwrap();
        t.store
            .close_session(recent, now - Duration::hours(1), 3600)
            .await
            .unwrap();
        t.store.open_session(now - Duration::minutes(1)).await.unwrap();

        let (status, body) = get_request(&t.app, "/api/sessions").await;
        assert_eq!(status, StatusCode::OK);
        let sessions: Vec<Session> = serde_json::from_str(&body).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, recent);
        assert_eq!(sessions[0].duration_seconds, Some(3600));
        assert!(body.contains("\"startTime\""));
        assert!(body.contains("\"durationSeconds\""));

        let (_, body) = get_request(&t.app, "/api/sessions?days=30").await;
        let sessions: Vec<Session> = serde_json::from_str(&body).unwrap();
        assert_eq!(sessions.len(), 2);

        t.controller.stop().await.unwrap();
    }

    #[tokio::test]
    async fn bad_days_is_rejected() {
        let mut t = test_app();
        let (status, _) = get_request(&t.app, "/api/sessions?days=-3").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, body) = get_request(&t.app, "/api/sessions?days=abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: crate::api::ErrorResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(error.error, "Bad request");
        assert!(error.details.is_some());
        t.controller.stop().await.unwrap();
    }
}
