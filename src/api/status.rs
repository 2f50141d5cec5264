use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub server: String,
    /// `connected` while the configured backend answers, `disconnected`
    /// while reads are served from memory.
    pub database: String,
    pub transport: String,
    pub backend: String,
    pub entity: String,
    pub presence: bool,
    pub playing: bool,
    pub readings_count: Option<u64>,
    pub sessions_count: Option<u64>,
    pub uptime_secs: u64,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

/// GET /api/status - Connectivity and live detector state.
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let live = state.live();
    let counts = match state.store.record_counts().await {
        Ok(counts) => Some(counts),
        Err(err) => {
            log::warn!("Record counts unavailable: {err}");
            None
        }
    };
    let database = if state.store.is_available() {
        "connected"
    } else {
        "disconnected"
    };

    Json(StatusResponse {
        server: "running".to_string(),
        database: database.to_string(),
        transport: state.transport.borrow().as_str().to_string(),
        backend: state.store.backend_name().to_string(),
        entity: state.settings.entity.clone(),
        presence: live.presence,
        playing: live.playing,
        readings_count: counts.map(|c| c.readings),
        sessions_count: counts.map(|c| c.sessions),
        uptime_secs: state.uptime_secs(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/status", get(get_status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn status_reports_backend_and_live_state() {
        let mut t = test_app();
        post_json(&t.app, "/api/readings", r#"{"distance": 90, "volume": 200}"#).await;

        let (status, body) = get_request(&t.app, "/api/status").await;
        assert_eq!(status, StatusCode::OK);
        let status: StatusResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(status.server, "running");
        assert_eq!(status.database, "connected");
        assert_eq!(status.transport, "idle");
        assert_eq!(status.backend, "memory");
        assert_eq!(status.entity, "piano");
        assert!(status.presence);
        assert!(status.playing);
        assert_eq!(status.readings_count, Some(1));
        assert_eq!(status.sessions_count, Some(1));

        t.controller.stop().await.unwrap();
    }
}
