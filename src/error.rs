use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

use crate::db::store::{StoreError, StoreResult};

/// Caller-visible failure kinds of the auth subsystem.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("bad request: {message}")]
    BadRequest { message: String },

    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("not found: {message}")]
    NotFound { message: String },

    /// Lost a uniqueness race; the whole operation may be retried.
    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("too many requests: {message}")]
    TooManyRequests { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },

    #[error("unavailable: {message}")]
    Unavailable { message: String },
}

impl AuthError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn too_many_requests() -> Self {
        Self::TooManyRequests {
            message: "Too many requests. Please try again later.".to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Maps a store failure, keeping `context` as the public message.
    pub fn from_store(err: StoreError, context: &str) -> Self {
        match err {
            StoreError::UniqueViolation { index } => {
                warn!(index, context, "uniqueness violation");
                Self::Conflict {
                    message: format!("{context}: concurrent request won, retry"),
                }
            }
            StoreError::Timeout => {
                warn!(context, "store call timed out");
                Self::Unavailable {
                    message: format!("{context}: storage timed out"),
                }
            }
            other => {
                error!(error = %other, context, "store failure");
                Self::internal(context)
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AuthError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            AuthError::NotFound { .. } => StatusCode::NOT_FOUND,
            AuthError::Conflict { .. } => StatusCode::CONFLICT,
            AuthError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            AuthError::BadRequest { .. } => "Bad Request",
            AuthError::Unauthorized { .. } => "Unauthorized",
            AuthError::NotFound { .. } => "Not Found",
            AuthError::Conflict { .. } => "Conflict",
            AuthError::TooManyRequests { .. } => "Rate limit exceeded",
            AuthError::Internal { .. } => "Internal Server Error",
            AuthError::Unavailable { .. } => "Service Unavailable",
        }
    }

    fn message(&self) -> &str {
        match self {
            AuthError::BadRequest { message }
            | AuthError::Unauthorized { message }
            | AuthError::NotFound { message }
            | AuthError::Conflict { message }
            | AuthError::TooManyRequests { message }
            | AuthError::Internal { message }
            | AuthError::Unavailable { message } => message,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.label().to_string(),
            message: self.message().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Outcome of a side effect whose failure is logged and then dropped.
///
/// Returned instead of `Result` so callers cannot `?` it into their own error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BestEffort {
    Applied,
    Dropped,
}

impl BestEffort {
    pub fn observe<T>(op: &'static str, res: StoreResult<T>) -> Self {
        match res {
            Ok(_) => BestEffort::Applied,
            Err(err) => {
                warn!(op, error = %err, "best-effort side effect failed");
                BestEffort::Dropped
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
