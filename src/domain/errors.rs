use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Errors raised while talking to the upstream ad platform.
#[derive(Debug, Error, Clone)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Request(String),

    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode upstream response: {0}")]
    Decode(String),
}

/// Local input validation failures, caught before anything goes upstream.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("bid amount must be a finite, positive number")]
    InvalidBid,

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Errors surfaced by the HTTP API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
