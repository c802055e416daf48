use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{AggregateError, ErrorKind};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    /// Malformed path segment or request body
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),
}

/// Body of every error response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: String,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(kind: &str, error: &str) -> Self {
        Self {
            kind: kind.to_string(),
            error: error.to_string(),
        }
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::Aggregate(err) => match err.kind() {
                ErrorKind::ValidationFailed => {
                    (StatusCode::BAD_REQUEST, "validation_failed", err.to_string())
                }
                ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found", err.to_string()),
                ErrorKind::Conflict => (StatusCode::CONFLICT, "conflict", err.to_string()),
                // The cause was logged when the unit of work was rolled back
                ErrorKind::TransactionFailed => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "transaction_failed",
                    err.to_string(),
                ),
            },
            ApiError::Unauthorized(message) => {
                (StatusCode::UNAUTHORIZED, "unauthorized", message.clone())
            }
            ApiError::Forbidden(message) => (StatusCode::FORBIDDEN, "forbidden", message.clone()),
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, "validation_failed", message.clone())
            }
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, "not_found", message.clone()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = self.parts();
        (status, Json(ErrorResponse::new(kind, &message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    #[test]
    fn test_status_codes() {
        let cases = [
            (
                ApiError::from(AggregateError::validation("updateRemark is required")),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(AggregateError::not_found("Asset", 1)),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(AggregateError::Conflict("duplicate".to_string())),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::Unauthorized("missing X-User-Id".to_string()),
                StatusCode::UNAUTHORIZED,
            ),
            (ApiError::Forbidden("no".to_string()), StatusCode::FORBIDDEN),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_transaction_failure_hides_cause() {
        let err = ApiError::from(AggregateError::from_store(
            "updating assets",
            StoreError::Backend(anyhow::anyhow!("password authentication failed")),
        ));
        let (status, kind, message) = err.parts();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(kind, "transaction_failed");
        assert_eq!(message, "transaction failed while updating assets");
    }
}
