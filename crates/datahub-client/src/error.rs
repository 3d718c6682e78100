//! Client errors.

use thiserror::Error;

/// Errors surfaced by the auth API client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Server answered 401.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Server answered 403.
    #[error("Access denied")]
    Forbidden,

    /// Any other non-success answer.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message from the `{error}` body, if any.
        message: String,
    },

    /// Request never got an answer.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Base URL could not be used.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    /// Whether the error means "no valid principal".
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthenticated | Self::Forbidden)
    }
}
