//! Token service: issues and verifies signed identity tokens.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::AuthError;
use super::revocation::RevocationList;
use super::users::Role;

/// Token signing errors.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Encoding or signing failed.
    #[error("Token signing failed: {0}")]
    Signing(String),

    /// Secret is not valid hex.
    #[error("Invalid token secret: {0}")]
    InvalidSecret(String),
}

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user identifier).
    pub sub: String,
    /// Role at issuance.
    pub role: Role,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
    /// Token id.
    pub jti: String,
}

/// Verified identity for a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// User identifier.
    pub user_id: String,
    /// Role embedded in the token.
    pub role: Role,
    /// Token id, used for revocation.
    pub token_id: String,
    /// Token expiry (Unix timestamp).
    pub expires_at: i64,
}

impl Principal {
    /// Check if the principal holds `admin` or above.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

impl From<Claims> for Principal {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            role: claims.role,
            token_id: claims.jti,
            expires_at: claims.exp,
        }
    }
}

/// A freshly issued token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Encoded token.
    pub token: String,
    /// Expiration instant.
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies HS256 tokens with a fixed validity window.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validity: Duration,
    revocations: RevocationList,
}

impl TokenService {
    /// Create a token service with a secret key.
    ///
    /// The secret should be at least 32 bytes.
    #[must_use]
    pub fn new(secret: &[u8], validity: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validity,
            revocations: RevocationList::new(),
        }
    }

    /// Create a token service from a hex-encoded secret.
    ///
    /// # Errors
    ///
    /// Returns error if hex decoding fails.
    pub fn from_hex_secret(hex_secret: &str, validity: Duration) -> Result<Self, TokenError> {
        let secret =
            hex::decode(hex_secret).map_err(|e| TokenError::InvalidSecret(e.to_string()))?;
        Ok(Self::new(&secret, validity))
    }

    /// Generate a random 256-bit secret key.
    #[must_use]
    pub fn generate_secret() -> [u8; 32] {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes
    }

    /// Generate a random secret as hex string.
    #[must_use]
    pub fn generate_hex_secret() -> String {
        hex::encode(Self::generate_secret())
    }

    /// Validity window of issued tokens.
    #[must_use]
    pub const fn validity(&self) -> Duration {
        self.validity
    }

    /// Issue a token for a user.
    ///
    /// # Errors
    ///
    /// Returns error if token encoding fails.
    pub fn issue(&self, user_id: &str, role: Role) -> Result<IssuedToken, TokenError> {
        self.issue_at(user_id, role, Utc::now())
    }

    /// Issue a token as if the current time were `now`.
    ///
    /// # Errors
    ///
    /// Returns error if token encoding fails.
    pub fn issue_at(
        &self,
        user_id: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let expires_at = chrono::Duration::from_std(self.validity)
            .ok()
            .and_then(|validity| now.checked_add_signed(validity))
            .ok_or_else(|| TokenError::Signing("Token validity window out of range".to_string()))?;

        let mut jti = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut jti);

        let claims = Claims {
            sub: user_id.to_string(),
            role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: hex::encode(jti),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(IssuedToken { token, expires_at })
    }

    /// Verify a token and return its principal.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthenticated` if the token is malformed,
    /// badly signed, expired, or revoked.
    pub fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "Token verification failed");
                AuthError::Unauthenticated
            })?
            .claims;

        if self.revocations.is_revoked(&claims.jti) {
            tracing::debug!(token_id = %claims.jti, "Rejected revoked token");
            return Err(AuthError::Unauthenticated);
        }

        Ok(claims.into())
    }

    /// Revoke a verified principal's token until it expires.
    pub fn revoke(&self, principal: &Principal) {
        self.revocations.revoke(
            &principal.token_id,
            principal.expires_at,
            Utc::now().timestamp(),
        );
    }

    /// Extract token from an Authorization header value.
    ///
    /// Expects format: "Bearer <token>"
    #[must_use]
    pub fn extract_from_header(header: &str) -> Option<&str> {
        header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("validity", &self.validity)
            .field("revoked", &self.revocations.len())
            .finish_non_exhaustive()
    }
}
