//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use twopc::{CoordinatorError, ParticipantError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Coordinator engine error.
    Coordinator(CoordinatorError),
    /// Participant engine error.
    Participant(ParticipantError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Coordinator(err) => coordinator_error_to_response(err),
            ApiError::Participant(err) => participant_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn coordinator_error_to_response(err: CoordinatorError) -> (StatusCode, String) {
    match &err {
        CoordinatorError::InvalidState { .. } => (StatusCode::CONFLICT, err.to_string()),
        CoordinatorError::NoParticipants(_) => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
        CoordinatorError::StoreUnavailable { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

fn participant_error_to_response(err: ParticipantError) -> (StatusCode, String) {
    match &err {
        ParticipantError::InvalidState { .. } => (StatusCode::CONFLICT, err.to_string()),
        ParticipantError::StoreUnavailable { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        ApiError::Coordinator(err)
    }
}

impl From<ParticipantError> for ApiError {
    fn from(err: ParticipantError) -> Self {
        ApiError::Participant(err)
    }
}
