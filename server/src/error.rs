//! Unified error handling for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] marksync_engine::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not cached: {0}")]
    NotCached(String),

    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("Still offline: {0}")]
    StillOffline(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Resource mutation failed: {0}")]
    Mutation(String),

    #[error("No handler registered for {0}")]
    NoHandler(marksync_engine::ResourceKind),

    #[error("Deadline exceeded: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                    None,
                )
            }
            AppError::Engine(e) => {
                tracing::warn!("Engine error: {:?}", e);
                (StatusCode::BAD_REQUEST, e.to_string(), None)
            }
            AppError::Serialization(e) => (StatusCode::BAD_REQUEST, e.to_string(), None),
            AppError::NotCached(key) => (StatusCode::NOT_FOUND, self.to_string(), Some(key.clone())),
            AppError::UnknownMessageType(_) | AppError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, self.to_string(), None)
            }
            AppError::StillOffline(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string(), None),
            AppError::Mutation(msg) => (StatusCode::BAD_GATEWAY, msg.clone(), None),
            AppError::NoHandler(_) => (StatusCode::NOT_IMPLEMENTED, self.to_string(), None),
            AppError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, self.to_string(), None),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    Some(msg.clone()),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let cases = [
            (AppError::NotCached("k".into()), StatusCode::NOT_FOUND),
            (
                AppError::Engine(marksync_engine::Error::InvalidChangeType("x".into())),
                StatusCode::BAD_REQUEST,
            ),
            (AppError::StillOffline("u".into()), StatusCode::SERVICE_UNAVAILABLE),
            (AppError::Timeout("sync".into()), StatusCode::GATEWAY_TIMEOUT),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
