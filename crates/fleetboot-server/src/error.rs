//! API errors and their JSON rendering

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fleetboot_macrostep::MacrostepError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors surfaced to API callers
#[derive(Debug, Error)]
pub enum ApiError {
    /// Rights check failed
    #[error("{0}")]
    InvalidRights(String),

    /// No authenticated user on the request
    #[error("missing user header")]
    Unauthenticated,

    #[error("{0}")]
    BadRequest(String),

    /// Kind belongs to another service
    #[error("{0} is not served here")]
    NotServed(String),

    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidRights(_) => "INVALID_RIGHTS",
            ApiError::Unauthenticated => "UNAUTHENTICATED",
            ApiError::BadRequest(_) => "INVALID_REQUEST",
            ApiError::NotServed(_) => "NOT_SERVED",
            ApiError::NotFound => "NOT_FOUND",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRights(_) => StatusCode::FORBIDDEN,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotServed(_) | ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<MacrostepError> for ApiError {
    fn from(err: MacrostepError) -> Self {
        match err {
            MacrostepError::AuthorizationDenied { .. } => ApiError::InvalidRights(err.to_string()),
            MacrostepError::UnknownMacrostep(_)
            | MacrostepError::InvalidLevel(_)
            | MacrostepError::EmptyBatch
            | MacrostepError::MissingArgument { .. } => ApiError::BadRequest(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<fleetboot_common::FleetError> for ApiError {
    fn from(err: fleetboot_common::FleetError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(message) = &self {
            error!(error = %message, "Request failed");
        }
        (
            self.status(),
            Json(json!({
                "error": self.code(),
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
