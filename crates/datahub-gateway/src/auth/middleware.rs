//! Authentication middleware for axum.
//!
//! `require_auth` and `require_admin` decide from the token alone. They
//! never consult the credential store, so a role change reaches a user
//! only with their next token.

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{
        HeaderMap,
        header::{AUTHORIZATION, COOKIE},
        request::Parts,
    },
};
use datahub_core::AuthConfig;

use super::AuthError;
use super::jwt::{Principal, TokenError, TokenService};
use super::users::{StoreError, UserStore};

/// Errors raised while assembling auth state.
#[derive(Debug, thiserror::Error)]
pub enum AuthInitError {
    /// Credential store failed to open.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Token secret was unusable.
    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Shared authentication state.
pub struct AuthState {
    /// Auth configuration.
    pub config: AuthConfig,
    /// Token service.
    pub tokens: TokenService,
    /// Credential store. Used by the controller only.
    pub users: UserStore,
}

impl AuthState {
    /// Create a new auth state.
    #[must_use]
    pub const fn new(config: AuthConfig, tokens: TokenService, users: UserStore) -> Self {
        Self {
            config,
            tokens,
            users,
        }
    }

    /// Open the credential store under `data_dir` and build the token service,
    /// generating a signing secret if the config has none.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be opened or the secret is invalid.
    pub fn initialize(mut config: AuthConfig, data_dir: &Path) -> Result<Self, AuthInitError> {
        let users = UserStore::open(data_dir)?;

        let secret = if let Some(secret) = &config.jwt_secret {
            secret.clone()
        } else {
            let secret = TokenService::generate_hex_secret();
            config.jwt_secret = Some(secret.clone());
            tracing::warn!("No token secret configured; generated one. Tokens will not survive a restart");
            secret
        };

        let tokens = TokenService::from_hex_secret(&secret, config.token_expiry())?;

        Ok(Self::new(config, tokens, users))
    }

    /// Pull the token from the request.
    ///
    /// `Authorization: Bearer` wins; the configured cookie is the fallback.
    #[must_use]
    pub fn extract_token<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        let from_header = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(TokenService::extract_from_header);

        from_header.or_else(|| cookie_value(headers, &self.config.cookie_name))
    }

    /// Establish the request's principal.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthenticated` if no token is present or it
    /// fails verification.
    pub fn require_auth(&self, headers: &HeaderMap) -> Result<Principal, AuthError> {
        let token = self
            .extract_token(headers)
            .ok_or(AuthError::Unauthenticated)?;

        self.tokens.verify(token)
    }

    /// Establish the request's principal and require `admin` or above.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthenticated` as `require_auth` does, and
    /// `AuthError::Forbidden` for a principal below `admin`.
    pub fn require_admin(&self, headers: &HeaderMap) -> Result<Principal, AuthError> {
        let principal = self.require_auth(headers)?;

        if !principal.is_admin() {
            tracing::warn!(
                user_id = %principal.user_id,
                role = %principal.role,
                "Admin access denied"
            );
            return Err(AuthError::Forbidden);
        }

        Ok(principal)
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("config", &self.config)
            .field("tokens", &self.tokens)
            .field("users", &self.users)
            .finish()
    }
}

/// Find a cookie by name in the `Cookie` headers.
fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

/// Extractor for authenticated requests.
///
/// Use this in handler parameters to require authentication.
#[derive(Debug, Clone)]
pub struct RequireAuth(pub Principal);

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
    Arc<AuthState>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = Arc::<AuthState>::from_ref(state);
        auth_state.require_auth(&parts.headers).map(Self)
    }
}

/// Require admin role extractor.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub Principal);

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
    Arc<AuthState>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = Arc::<AuthState>::from_ref(state);
        auth_state.require_admin(&parts.headers).map(Self)
    }
}

/// Extractor for optional authentication.
///
/// `None` when no valid token is present.
#[derive(Debug, Clone)]
pub struct OptionalAuth(pub Option<Principal>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
    Arc<AuthState>: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = Arc::<AuthState>::from_ref(state);
        Ok(Self(auth_state.require_auth(&parts.headers).ok()))
    }
}
