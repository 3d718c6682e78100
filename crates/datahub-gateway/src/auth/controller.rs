//! Auth controller: login, registration, logout, profile and password change.
//!
//! Every lower-level failure is translated into an [`ApiError`] here.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use datahub_core::validation::{
    limits, normalize_identifier, sanitize_display_attribute, validate_identifier,
    validate_password,
};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::jwt::{Principal, TokenError};
use super::middleware::AuthState;
use super::users::{PublicUser, Role, StoreError, User, hash_password, verify_password};

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Exists(_) => Self::Conflict("Identifier is already taken".to_string()),
            StoreError::NotFound(_) => Self::NotFound("User not found".to_string()),
            StoreError::Invalid(msg) => Self::Validation(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Login request body.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    /// User identifier.
    pub id: String,
    /// Plaintext password.
    pub password: String,
}

/// Registration request body.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    /// Desired identifier.
    pub id: String,
    /// Plaintext password.
    pub password: String,
    /// Optional display name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Optional email.
    #[serde(default)]
    pub email: Option<String>,
}

/// Password change request body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordRequest {
    /// Current password, re-validated before the change.
    pub current_password: String,
    /// Replacement password.
    pub new_password: String,
}

/// Successful login or registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Identity token.
    pub token: String,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
    /// Public user attributes.
    pub user: PublicUser,
}

/// Plain acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    /// Always true.
    pub success: bool,
}

impl Ack {
    const fn ok() -> Self {
        Self { success: true }
    }
}

/// Hash checked when the identifier is unknown, so a miss costs the same
/// as a wrong password.
fn dummy_hash() -> Option<&'static str> {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    DUMMY
        .get_or_init(|| hash_password("datahub-timing-equalizer").ok())
        .as_deref()
}

impl AuthState {
    /// Controller borrowing this state.
    #[must_use]
    pub const fn controller(&self) -> AuthController<'_> {
        AuthController::new(self)
    }
}

/// Orchestrates auth operations against the credential store and token service.
#[derive(Debug, Clone, Copy)]
pub struct AuthController<'a> {
    state: &'a AuthState,
}

impl<'a> AuthController<'a> {
    /// Create a controller over shared auth state.
    #[must_use]
    pub const fn new(state: &'a AuthState) -> Self {
        Self { state }
    }

    fn respond_with_token(&self, user: &User) -> Result<AuthResponse, ApiError> {
        let issued = self.state.tokens.issue(&user.id, user.role)?;
        Ok(AuthResponse {
            token: issued.token,
            expires_at: issued.expires_at,
            user: user.to_public(),
        })
    }

    /// Check credentials and issue a token.
    ///
    /// # Errors
    ///
    /// `Validation` for empty fields, `Unauthenticated` for an unknown
    /// identifier or wrong password (indistinguishable), `Internal` for
    /// store or signing failures.
    pub fn login(&self, request: &LoginRequest) -> Result<AuthResponse, ApiError> {
        let id = normalize_identifier(&request.id);
        if id.is_empty() || request.password.is_empty() {
            return Err(ApiError::Validation(
                "Identifier and password are required".to_string(),
            ));
        }

        let Some(user) = self.state.users.get(&id)? else {
            if let Some(hash) = dummy_hash() {
                let _ = verify_password(&request.password, hash);
            }
            tracing::warn!(user_id = %id, "Login failed");
            return Err(ApiError::Unauthenticated);
        };

        if !user.verify_password(&request.password)? {
            tracing::warn!(user_id = %id, "Login failed");
            return Err(ApiError::Unauthenticated);
        }

        let user = self.state.users.touch_last_login(&user.id)?;
        tracing::info!(user_id = %user.id, role = %user.role, "User logged in");

        self.respond_with_token(&user)
    }

    /// Create a `user`-role account and log it in.
    ///
    /// # Errors
    ///
    /// `Validation` for malformed input, `Conflict` for a taken
    /// identifier, `Internal` for store or signing failures.
    pub fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ApiError> {
        let id = validate_identifier(&request.id)?;
        validate_password(&request.password, self.state.config.password_policy())?;
        let display_name = sanitize_display_attribute(
            request.display_name.as_deref(),
            "Display name",
            limits::MAX_DISPLAY_NAME_LENGTH,
        )?;
        let email =
            sanitize_display_attribute(request.email.as_deref(), "Email", limits::MAX_EMAIL_LENGTH)?;

        let mut user = User::new(&id, &request.password, Role::User)?;
        user.display_name = display_name;
        user.email = email;

        self.state.users.create(&user).inspect_err(|e| {
            if matches!(e, StoreError::Exists(_)) {
                tracing::info!(user_id = %id, "Registration rejected: identifier taken");
            }
        })?;

        tracing::info!(user_id = %user.id, "User registered");
        self.respond_with_token(&user)
    }

    /// Acknowledge a logout.
    ///
    /// With `revokeOnLogout` enabled the presented token stops verifying;
    /// otherwise the server keeps no state and the client discards the token.
    #[must_use]
    pub fn logout(&self, principal: Option<&Principal>) -> Ack {
        if let Some(principal) = principal {
            if self.state.config.revoke_on_logout {
                self.state.tokens.revoke(principal);
                tracing::info!(user_id = %principal.user_id, "Token revoked on logout");
            } else {
                tracing::debug!(user_id = %principal.user_id, "User logged out");
            }
        }
        Ack::ok()
    }

    /// Public record of the authenticated principal.
    ///
    /// # Errors
    ///
    /// `NotFound` if the record was removed after the token was issued.
    pub fn get_me(&self, principal: &Principal) -> Result<PublicUser, ApiError> {
        self.state
            .users
            .get(&principal.user_id)?
            .as_ref()
            .map(User::to_public)
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
    }

    /// Replace the principal's password after re-checking the current one.
    ///
    /// The check and the write happen in one atomic update of the record.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` on a wrong current password (hash unchanged),
    /// `Validation` for an unacceptable new password, `NotFound` if the
    /// record is gone, `Internal` otherwise.
    pub fn change_password(
        &self,
        principal: &Principal,
        request: &ChangePasswordRequest,
    ) -> Result<Ack, ApiError> {
        validate_password(&request.new_password, self.state.config.password_policy())?;
        let new_hash = hash_password(&request.new_password)?;

        self.state.users.update(&principal.user_id, |user| {
            if !user.verify_password(&request.current_password)? {
                return Err(ApiError::Unauthenticated);
            }
            user.password_hash.clone_from(&new_hash);
            Ok(())
        })
        .inspect_err(|e| {
            if matches!(e, ApiError::Unauthenticated) {
                tracing::warn!(user_id = %principal.user_id, "Password change rejected");
            }
        })?;

        tracing::info!(user_id = %principal.user_id, "Password changed");
        Ok(Ack::ok())
    }

    /// All users' public records. Callers gate this with `require_admin`.
    ///
    /// # Errors
    ///
    /// `Internal` if the store fails.
    pub fn list_users(&self) -> Result<Vec<PublicUser>, ApiError> {
        Ok(self
            .state
            .users
            .list()?
            .iter()
            .map(User::to_public)
            .collect())
    }
}
