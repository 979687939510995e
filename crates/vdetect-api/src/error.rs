//! API error types.

use axum::extract::multipart::MultipartError;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use vdetect_worker::WorkerError;

use crate::config::Environment;

pub type ApiResult<T> = Result<T, ApiError>;

/// Seconds a client should wait before retrying a refused upload.
const RETRY_AFTER_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) | ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<WorkerError> for ApiError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::QueueFull | WorkerError::ShuttingDown => {
                ApiError::ServiceUnavailable(err.to_string())
            }
            WorkerError::JobNotFound(id) => ApiError::NotFound(format!("Job {}", id)),
            WorkerError::JobAlreadyFinished(id) => {
                ApiError::Conflict(format!("Job {} has already finished", id))
            }
            WorkerError::InvalidFilename(msg) => ApiError::BadRequest(msg),
            WorkerError::Io(e) => ApiError::Io(e),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(err.body_text())
        } else {
            ApiError::BadRequest(format!("Invalid multipart body: {}", err.body_text()))
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = match &self {
            ApiError::Internal(_) | ApiError::Io(_) => {
                if Environment::from_env() == Environment::Production {
                    "An internal error occurred".to_string()
                } else {
                    self.to_string()
                }
            }
            _ => self.to_string(),
        };

        let code = match &self {
            ApiError::ServiceUnavailable(_) => Some("service_unavailable".to_string()),
            ApiError::RateLimited => Some("rate_limited".to_string()),
            _ => None,
        };

        let body = ErrorResponse { detail, code };

        if status == StatusCode::SERVICE_UNAVAILABLE {
            return (
                status,
                [(header::RETRY_AFTER, RETRY_AFTER_SECS.to_string())],
                Json(body),
            )
                .into_response();
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_error_mapping() {
        let cases = [
            (WorkerError::QueueFull, StatusCode::SERVICE_UNAVAILABLE),
            (WorkerError::ShuttingDown, StatusCode::SERVICE_UNAVAILABLE),
            (WorkerError::JobNotFound("x".into()), StatusCode::NOT_FOUND),
            (WorkerError::JobAlreadyFinished("x".into()), StatusCode::CONFLICT),
            (WorkerError::InvalidFilename("x".into()), StatusCode::BAD_REQUEST),
            (WorkerError::Cancelled, StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status_code(), expected);
        }
    }

    #[test]
    fn test_service_unavailable_sets_retry_after() {
        let response = ApiError::from(WorkerError::QueueFull).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "5");
    }
}
