//! Authentication configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::validation::PasswordPolicy;

/// Default token expiry in hours.
const DEFAULT_TOKEN_EXPIRY_HOURS: u64 = 24;
/// Default cookie carrying the identity token.
const DEFAULT_COOKIE_NAME: &str = "datahub_token";
/// Default minimum password length.
const DEFAULT_MIN_PASSWORD_LENGTH: usize = 8;
/// Default maximum password length.
const DEFAULT_MAX_PASSWORD_LENGTH: usize = 128;
/// Longest accepted token validity window (one year).
const MAX_TOKEN_EXPIRY_HOURS: u64 = 24 * 366;
/// Default login attempts per identifier per minute.
const DEFAULT_LOGIN_ATTEMPTS_PER_MINUTE: u32 = 10;

/// Authentication configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// JWT secret (hex-encoded). Generated at startup if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,

    /// Token validity window in hours.
    #[serde(default = "default_token_expiry")]
    pub token_expiry_hours: u64,

    /// Cookie name used for token transport.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Minimum accepted password length (characters).
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,

    /// Maximum accepted password length (characters).
    #[serde(default = "default_max_password_length")]
    pub max_password_length: usize,

    /// Revoke a token's id on logout.
    #[serde(default)]
    pub revoke_on_logout: bool,

    /// Login attempts allowed per identifier per minute.
    #[serde(default = "default_login_attempts")]
    pub login_attempts_per_minute: u32,
}

fn default_token_expiry() -> u64 {
    DEFAULT_TOKEN_EXPIRY_HOURS
}

fn default_cookie_name() -> String {
    DEFAULT_COOKIE_NAME.to_string()
}

fn default_min_password_length() -> usize {
    DEFAULT_MIN_PASSWORD_LENGTH
}

fn default_max_password_length() -> usize {
    DEFAULT_MAX_PASSWORD_LENGTH
}

fn default_login_attempts() -> u32 {
    DEFAULT_LOGIN_ATTEMPTS_PER_MINUTE
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_expiry_hours: default_token_expiry(),
            cookie_name: default_cookie_name(),
            min_password_length: default_min_password_length(),
            max_password_length: default_max_password_length(),
            revoke_on_logout: false,
            login_attempts_per_minute: default_login_attempts(),
        }
    }
}

impl AuthConfig {
    /// Create a new auth config builder.
    #[must_use]
    pub fn builder() -> AuthConfigBuilder {
        AuthConfigBuilder::default()
    }

    /// Get token expiry as Duration.
    #[must_use]
    pub const fn token_expiry(&self) -> Duration {
        Duration::from_secs(self.token_expiry_hours.saturating_mul(3600))
    }

    /// Password rules derived from the configured lengths.
    #[must_use]
    pub const fn password_policy(&self) -> PasswordPolicy {
        PasswordPolicy {
            min_length: self.min_password_length,
            max_length: self.max_password_length,
        }
    }

    /// Load overrides from environment variables.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(secret) = std::env::var("DATAHUB_JWT_SECRET") {
            if !secret.is_empty() {
                self.jwt_secret = Some(secret);
            }
        }

        self
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.token_expiry_hours == 0 {
            return Err(ConfigError::Validation(
                "Token expiry must be at least one hour".to_string(),
            ));
        }
        if self.token_expiry_hours > MAX_TOKEN_EXPIRY_HOURS {
            return Err(ConfigError::Validation(format!(
                "Token expiry cannot exceed {MAX_TOKEN_EXPIRY_HOURS} hours"
            )));
        }
        if self.min_password_length == 0 {
            return Err(ConfigError::Validation(
                "Minimum password length must be at least 1".to_string(),
            ));
        }
        if self.max_password_length < self.min_password_length {
            return Err(ConfigError::Validation(
                "Maximum password length is below the minimum".to_string(),
            ));
        }
        if self.cookie_name.is_empty() {
            return Err(ConfigError::Validation(
                "Cookie name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field("token_expiry_hours", &self.token_expiry_hours)
            .field("cookie_name", &self.cookie_name)
            .field("min_password_length", &self.min_password_length)
            .field("max_password_length", &self.max_password_length)
            .field("revoke_on_logout", &self.revoke_on_logout)
            .field("login_attempts_per_minute", &self.login_attempts_per_minute)
            .finish()
    }
}

/// Builder for `AuthConfig`.
#[derive(Debug, Default)]
pub struct AuthConfigBuilder {
    config: AuthConfig,
}

impl AuthConfigBuilder {
    /// Set the JWT secret (hex).
    #[must_use]
    pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.jwt_secret = Some(secret.into());
        self
    }

    /// Set token expiry in hours.
    #[must_use]
    pub const fn token_expiry_hours(mut self, hours: u64) -> Self {
        self.config.token_expiry_hours = hours;
        self
    }

    /// Set the token cookie name.
    #[must_use]
    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.config.cookie_name = name.into();
        self
    }

    /// Set the minimum password length.
    #[must_use]
    pub const fn min_password_length(mut self, len: usize) -> Self {
        self.config.min_password_length = len;
        self
    }

    /// Set whether logout revokes the presented token.
    #[must_use]
    pub const fn revoke_on_logout(mut self, revoke: bool) -> Self {
        self.config.revoke_on_logout = revoke;
        self
    }

    /// Set login attempts per identifier per minute.
    #[must_use]
    pub const fn login_attempts_per_minute(mut self, attempts: u32) -> Self {
        self.config.login_attempts_per_minute = attempts;
        self
    }

    /// Build the config.
    #[must_use]
    pub fn build(self) -> AuthConfig {
        self.config
    }
}
