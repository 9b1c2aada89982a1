//! API error type.
//!
//! Every failure leaves the service as `{"error": {"code", "message"}}`.
//! Internal errors are logged with their detail and answered with a generic
//! message only.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ingest::IngestError;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable code, e.g. `NOT_FOUND`.
    pub code: String,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or malformed input (400).
    #[error("{0}")]
    Validation(String),

    /// Unknown record (404).
    #[error("{0}")]
    NotFound(String),

    /// Anything else (500). Logged, never returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => {
                tracing::error!(error = %self, "internal server error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Validation(msg) => Self::Validation(msg),
            IngestError::NotFound(id) => Self::NotFound(format!("image {id} not found")),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogError;
    use crate::fetch::FetchError;
    use http_body_util::BodyExt;
    use uuid::Uuid;

    #[test]
    fn validation_is_bad_request() {
        let (status, code) = AppError::Validation("url is required".into()).status_and_code();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, "VALIDATION_ERROR");
    }

    #[test]
    fn ingest_errors_map_to_status_codes() {
        let id = Uuid::new_v4();
        let cases: Vec<(IngestError, StatusCode)> = vec![
            (IngestError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (IngestError::NotFound(id), StatusCode::NOT_FOUND),
            (
                IngestError::Fetch(FetchError::Timeout { url: "u".into() }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                IngestError::Catalog(CatalogError::Timeout),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            let (status, _) = AppError::from(err).status_and_code();
            assert_eq!(status, expected);
        }
    }

    #[tokio::test]
    async fn internal_detail_is_not_in_the_body() {
        let response = AppError::Internal("password=hunter2".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let raw = String::from_utf8_lossy(&bytes);
        assert!(!raw.contains("hunter2"));
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error.code, "INTERNAL_ERROR");
        assert_eq!(body.error.message, "An internal error occurred");
    }

    #[test]
    fn not_found_message_names_the_id() {
        let id = Uuid::nil();
        let err = AppError::from(IngestError::NotFound(id));
        assert!(err.to_string().contains(&id.to_string()));
    }
}
