//! Error taxonomy for authentication and the HTTP boundary.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use datahub_core::ValidationError;
use serde::Serialize;
use thiserror::Error;

const UNAUTHENTICATED_MESSAGE: &str = "Not authenticated";
const FORBIDDEN_MESSAGE: &str = "Access denied";
const INTERNAL_MESSAGE: &str = "Internal server error";

/// Outcome of a failed authentication or authorization check.
///
/// Carries no status code; the boundary maps it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No valid principal could be established.
    #[error("Not authenticated")]
    Unauthenticated,

    /// A valid principal lacks the required role.
    #[error("Access denied")]
    Forbidden,
}

/// Closed set of failures an auth operation can surface.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No, invalid or expired token, or bad login credentials.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Valid principal with an insufficient role.
    #[error("Access denied")]
    Forbidden,

    /// Duplicate identifier on registration.
    #[error("{0}")]
    Conflict(String),

    /// Malformed input.
    #[error("{0}")]
    Validation(String),

    /// Principal's backing record is missing.
    #[error("{0}")]
    NotFound(String),

    /// Unexpected store or signing failure. The detail is logged, never sent.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Status code the boundary answers with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            // Duplicate registration is reported as a bad request.
            Self::Conflict(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show the caller.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Unauthenticated => UNAUTHENTICATED_MESSAGE.to_string(),
            Self::Forbidden => FORBIDDEN_MESSAGE.to_string(),
            Self::Conflict(msg) | Self::Validation(msg) | Self::NotFound(msg) => msg.clone(),
            Self::Internal(_) => INTERNAL_MESSAGE.to_string(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated => Self::Unauthenticated,
            AuthError::Forbidden => Self::Forbidden,
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Application error: a user-facing message plus the HTTP status to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppError {
    /// HTTP status.
    pub status: StatusCode,
    /// User-facing message.
    pub message: String,
}

impl AppError {
    /// Create an application error.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// 500 with the generic message.
    #[must_use]
    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE)
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.status.as_u16())
    }
}

impl std::error::Error for AppError {}

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        if let ApiError::Internal(detail) = &err {
            tracing::error!(error = %detail, "Internal error while handling auth request");
        }
        Self::new(err.status(), err.public_message())
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        ApiError::from(err).into()
    }
}

/// Body of every error response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        AppError::from(self).into_response()
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        AppError::from(self).into_response()
    }
}
