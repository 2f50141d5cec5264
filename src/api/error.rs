use axum::{
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::{ingest::IngestError, sensing::MonitorUnavailable, store::StoreError};

/// JSON body of every error response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid reading: {0}")]
    Ingest(#[from] IngestError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    MonitorUnavailable(#[from] MonitorUnavailable),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::BadRequest(msg) => {
                log::warn!("Bad request: {msg}");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg.clone()),
                )
            }
            ApiError::Ingest(err) => {
                log::warn!("Rejected reading: {err}");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details(
                        "Missing required fields: distance and volume",
                        err.to_string(),
                    ),
                )
            }
            ApiError::Store(StoreError::SessionNotFound(id)) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::with_details("Session not found", format!("Session ID: {id}")),
            ),
            ApiError::Store(err) => {
                log::error!("Store error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_details("Store error", err.to_string()),
                )
            }
            ApiError::MonitorUnavailable(_) => {
                log::error!("Reading submitted while the monitor is stopped");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorResponse::new("Monitor not running"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
