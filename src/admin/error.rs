use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::certs::CertError;
use crate::model::FieldError;
use crate::reload::ApplyError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String, Vec<FieldError>),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<FieldError>,
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let (status, error, message, details) = match self {
            AdminError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, Vec::new()),
            AdminError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, Vec::new()),
            AdminError::Validation(msg, details) => {
                (StatusCode::BAD_REQUEST, "validation_error", msg, details)
            }
            AdminError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    Vec::new(),
                )
            }
        };

        (
            status,
            Json(ErrorBody {
                error,
                message,
                details,
            }),
        )
            .into_response()
    }
}

impl From<StoreError> for AdminError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => AdminError::NotFound(err.to_string()),
            StoreError::Conflict(msg) => AdminError::Conflict(msg),
            StoreError::Invalid(details) => {
                AdminError::Validation("invalid record".to_string(), details)
            }
            other => AdminError::Internal(other.to_string()),
        }
    }
}

impl From<CertError> for AdminError {
    fn from(err: CertError) -> Self {
        match err {
            CertError::Store(e) => e.into(),
            other => AdminError::Internal(other.to_string()),
        }
    }
}

impl From<ApplyError> for AdminError {
    fn from(err: ApplyError) -> Self {
        AdminError::Internal(err.to_string())
    }
}
