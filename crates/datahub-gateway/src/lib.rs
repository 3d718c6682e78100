//! # Datahub Gateway
//!
//! HTTP gateway with token-based authentication and role-based access.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication and authorization.
pub mod auth;
mod middleware;
mod server;

pub use auth::{
    ApiError, AppError, AuthError, AuthState, Principal, PublicUser, Role, TokenService, User,
    UserStore,
};
pub use middleware::LoginRateLimiter;
pub use server::{Gateway, GatewayState, router};

use datahub_core::Config;

/// Start the gateway server.
///
/// # Errors
///
/// Returns error if server fails to start.
pub async fn start(config: Config) -> Result<(), GatewayError> {
    let gateway = Gateway::new(config)?;
    gateway.run().await
}

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Server error.
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
