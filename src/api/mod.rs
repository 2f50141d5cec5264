//! HTTP query API served under `/api`.

pub mod error;
pub mod readings;
pub mod sessions;
pub mod stats;
pub mod status;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub use error::{ApiError, ApiResult, ErrorResponse};

/// Routes:
/// - GET  /api/readings?hours=N - Samples from the last N hours (default 24)
/// - POST /api/readings - Ingest one reading through the monitor
/// - GET  /api/sessions?days=N - Closed sessions from the last N days (default 7)
/// - GET  /api/stats - Daily counts, record and presence
/// - GET  /api/summary - Last 24 hours at a glance
/// - GET  /api/status - Connectivity and live state
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", readings::router())
        .nest("/api", sessions::router())
        .nest("/api", stats::router())
        .nest("/api", status::router())
        .with_state(state)
}

/// Full application: API routes plus CORS for any origin and request tracing.
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
