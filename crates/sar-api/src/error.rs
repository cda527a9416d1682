//! # API Error Types
//!
//! Maps registry errors to HTTP status codes with a JSON body:
//!
//! ```json
//! {"error": {"code": "NOT_FOUND", "message": "artefact not found: ns/lib/1.0"}}
//! ```
//!
//! Server-side failures are logged and answered with a generic message.

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use sar_core::ValidationError;
use sar_store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Realm advertised on every 401.
pub const AUTH_REALM: &str = "Simple Artefact Registry";

/// Structured JSON error response body.
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

/// Request-level failure.
#[derive(Error, Debug)]
pub enum AppError {
    /// Coordinate segment failed validation (400).
    #[error("{0}")]
    InvalidIdentity(String),

    /// Malformed path, query string or request header (400).
    #[error("{0}")]
    BadRequest(String),

    /// Missing or unacceptable credentials, or anonymous caller denied (401).
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated caller denied by policy (403).
    #[error("{0}")]
    Forbidden(String),

    /// No such artefact (404).
    #[error("{0}")]
    NotFound(String),

    /// Body length disagrees with `Content-Length` (409).
    #[error("{0}")]
    SizeMismatch(String),

    /// Upload stream broke before completion (400).
    #[error("{0}")]
    Interrupted(String),

    /// Stored bytes failed verification (500). Not shown to clients.
    #[error("{0}")]
    Corrupt(String),

    /// Storage medium failure (503). Not shown to clients.
    #[error("{0}")]
    Unavailable(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::InvalidIdentity(_) => (StatusCode::BAD_REQUEST, "INVALID_IDENTITY"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::SizeMismatch(_) => (StatusCode::CONFLICT, "SIZE_MISMATCH"),
            Self::Interrupted(_) => (StatusCode::BAD_REQUEST, "UPLOAD_INTERRUPTED"),
            Self::Corrupt(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CORRUPT_ARTEFACT"),
            Self::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "STORAGE_UNAVAILABLE"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Corrupt(detail) => {
                tracing::error!(%detail, "artefact failed integrity verification");
                "stored artefact failed integrity verification".to_string()
            }
            Self::Unavailable(detail) => {
                tracing::error!(%detail, "storage failure");
                "storage temporarily unavailable".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };
        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, www_authenticate());
        }
        response
    }
}

/// `WWW-Authenticate` challenge value for [`AUTH_REALM`].
pub fn www_authenticate() -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer realm=\"{AUTH_REALM}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("Bearer"))
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::InvalidIdentity(err.to_string())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidIdentity(e) => Self::InvalidIdentity(e.to_string()),
            e @ StoreError::NotFound(_) => Self::NotFound(e.to_string()),
            e @ StoreError::SizeMismatch { .. } => Self::SizeMismatch(e.to_string()),
            e @ StoreError::Interrupted { .. } => Self::Interrupted(e.to_string()),
            e @ StoreError::CorruptArtefact { .. } => Self::Corrupt(e.to_string()),
            e @ StoreError::StorageUnavailable { .. } => Self::Unavailable(e.to_string()),
        }
    }
}
