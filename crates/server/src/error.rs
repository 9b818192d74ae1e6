// crates/server/src/error.rs
//! Typed API errors and the JSON error envelope.
//!
//! Every non-2xx response carries
//! `{detail, error_code, correlation_id, timestamp, details}`. The
//! correlation id comes from the request-scoped task local set by the
//! correlation middleware.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use burntop_core::CoreError;
use burntop_db::DbError;

use crate::middleware::correlation;

/// Structured error envelope returned on every non-2xx response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorEnvelope {
    pub detail: String,
    pub error_code: String,
    pub correlation_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub details: serde_json::Value,
}

/// API error types that map to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("You do not have permission to perform this action")]
    Forbidden,

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Rate limit exceeded. Retry after {retry_after} seconds.")]
    RateLimited { retry_after: u64 },

    #[error("Database error: {0}")]
    Database(DbError),
}

impl ApiError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        ApiError::NotFound {
            resource: resource.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::Forbidden => "FORBIDDEN",
            ApiError::NotFound { .. } => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            ApiError::Database(_) => "DATABASE_ERROR",
        }
    }

    fn details(&self) -> serde_json::Value {
        match self {
            ApiError::NotFound { resource } => serde_json::json!({ "resource": resource }),
            ApiError::RateLimited { retry_after } => {
                serde_json::json!({ "retry_after": retry_after })
            }
            _ => serde_json::json!({}),
        }
    }

    /// Client-facing detail string. Database internals stay in the logs.
    fn detail(&self) -> String {
        match self {
            ApiError::Database(_) => "A database error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Validation(message) => ApiError::Validation(message),
            DbError::Conflict(message) => ApiError::Conflict(message),
            other => ApiError::Database(other),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "Request failed");
        } else {
            tracing::warn!(error = %self, code = self.error_code(), "Request rejected");
        }

        let envelope = ErrorEnvelope {
            detail: self.detail(),
            error_code: self.error_code().to_string(),
            correlation_id: correlation::current().unwrap_or_else(Uuid::new_v4),
            timestamp: Utc::now(),
            details: self.details(),
        };
        (status, Json(envelope)).into_response()
    }
}

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn extract(response: Response) -> (StatusCode, ErrorEnvelope) {
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn validation_maps_to_422() {
        let (status, body) =
            extract(ApiError::Validation("messages must not be empty".into()).into_response())
                .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.error_code, "VALIDATION_ERROR");
        assert_eq!(body.detail, "messages must not be empty");
    }

    #[tokio::test]
    async fn not_found_carries_resource_details() {
        let (status, body) = extract(ApiError::not_found("Benchmark").into_response()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error_code, "NOT_FOUND");
        assert_eq!(body.details["resource"], "Benchmark");
    }

    #[tokio::test]
    async fn rate_limited_reports_retry_after() {
        let (status, body) =
            extract(ApiError::RateLimited { retry_after: 17 }.into_response()).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body.details["retry_after"], 17);
    }

    #[tokio::test]
    async fn database_errors_do_not_leak_internals() {
        let err = ApiError::Database(DbError::NoCacheDir);
        let (status, body) = extract(err.into_response()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.detail, "A database error occurred");
        assert_eq!(body.error_code, "DATABASE_ERROR");
    }

    #[test]
    fn db_validation_and_conflict_remap() {
        let err: ApiError = DbError::Validation("bad username".into()).into();
        assert!(matches!(err, ApiError::Validation(_)));
        let err: ApiError = DbError::Conflict("taken".into()).into();
        assert!(matches!(err, ApiError::Conflict(_)));
    }
}
