//! # API Error Type
//!
//! Maps gateway failures to HTTP responses. Binding and protocol failures
//! render as RFC-7807 `application/problem+json` documents; internal
//! errors are logged and never leak details to clients.

use axum::extract::rejection::JsonRejection;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use lamdis_core::Problem;
use serde_json::json;
use thiserror::Error;

/// Application-level error type implementing [`IntoResponse`].
#[derive(Debug, Error)]
pub enum ApiError {
    /// A problem document with an explicit status (409 for binding
    /// failures, 400 for protocol violations).
    #[error("problem {status}")]
    Problem {
        /// HTTP status to respond with.
        status: StatusCode,
        /// The problem document body.
        problem: Problem,
    },

    /// Resource not found (404). Used for unknown tenants.
    #[error("not found: {0}")]
    NotFound(String),

    /// Request body rejected by the extractor (malformed JSON, body over
    /// the size cap). The rejection's own status is preserved so an
    /// oversized body is 413, not 400.
    #[error("rejected: {message}")]
    Rejection {
        /// Status reported by the extractor.
        status: StatusCode,
        /// Extractor-provided message.
        message: String,
    },

    /// Internal server error (500). Detail is logged but not returned.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// A 409 problem-document error.
    pub fn conflict(problem: Problem) -> Self {
        Self::Problem {
            status: StatusCode::CONFLICT,
            problem,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Problem { status, problem } => (
                status,
                [(header::CONTENT_TYPE, "application/problem+json")],
                Json(problem),
            )
                .into_response(),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message).into_response(),
            Self::Rejection { status, message } => {
                (status, Json(json!({"error": message}))).into_response()
            }
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "An internal error occurred"})),
                )
                    .into_response()
            }
        }
    }
}

/// Extract a JSON body, preserving the extractor's status on rejection.
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    result.map(|Json(v)| v).map_err(|err| ApiError::Rejection {
        status: err.status(),
        message: err.body_text(),
    })
}
