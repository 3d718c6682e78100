//! Auth API seen from the client.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// User role as reported by the server, ordered `User < Admin < Superadmin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular account.
    User,
    /// Administrative access.
    Admin,
    /// Administrative access, including over other administrators.
    Superadmin,
}

impl Role {
    /// `admin` or above.
    #[must_use]
    pub fn is_admin(self) -> bool {
        self >= Self::Admin
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::Admin => "admin",
            Self::Superadmin => "superadmin",
        })
    }
}

/// Public attributes of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    /// Identifier.
    pub id: String,
    /// Role.
    pub role: Role,
    /// Display name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Email.
    #[serde(default)]
    pub email: Option<String>,
}

/// Login credentials. The password is redacted from `Debug`.
#[derive(Debug)]
pub struct Credentials {
    /// Identifier.
    pub id: String,
    /// Password.
    pub password: SecretString,
}

impl Credentials {
    /// Build credentials.
    pub fn new(id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            password: SecretString::from(password.into()),
        }
    }
}

/// Server calls the session depends on.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Resolve the current principal.
    async fn who_am_i(&self) -> Result<SessionUser, ClientError>;

    /// Exchange credentials for a token held by the implementation.
    async fn login(&self, credentials: &Credentials) -> Result<SessionUser, ClientError>;

    /// Tell the server and drop the held token.
    async fn logout(&self) -> Result<(), ClientError>;
}

#[derive(Serialize)]
struct LoginBody<'a> {
    id: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
    user: SessionUser,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// `AuthApi` over the gateway's REST routes, carrying the token as a bearer header.
pub struct HttpAuthApi {
    client: Client,
    base_url: String,
    token: RwLock<Option<SecretString>>,
}

impl HttpAuthApi {
    /// Client for the gateway at `base_url`, e.g. `http://127.0.0.1:8787`.
    ///
    /// # Errors
    ///
    /// Returns error if `base_url` is not an absolute URL.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let parsed = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        if parsed.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }

        Ok(Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        })
    }

    /// Client that starts out holding `token`.
    ///
    /// # Errors
    ///
    /// Returns error if `base_url` is not an absolute URL.
    pub fn with_token(base_url: &str, token: impl Into<String>) -> Result<Self, ClientError> {
        let api = Self::new(base_url)?;
        api.set_token(Some(token.into()));
        Ok(api)
    }

    /// Whether a token is held.
    #[must_use]
    pub fn has_token(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) =
            token.map(SecretString::from);
    }

    fn bearer(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|t| t.expose_secret().to_string())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl std::fmt::Debug for HttpAuthApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAuthApi")
            .field("base_url", &self.base_url)
            .field("has_token", &self.has_token())
            .finish_non_exhaustive()
    }
}

/// Map a non-success response to a `ClientError`.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::UNAUTHORIZED => Err(ClientError::Unauthenticated),
        StatusCode::FORBIDDEN => Err(ClientError::Forbidden),
        _ => {
            let message = response.json::<ErrorBody>().await.map_or_else(
                |_| status.canonical_reason().unwrap_or_default().to_string(),
                |body| body.error,
            );
            Err(ClientError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn who_am_i(&self) -> Result<SessionUser, ClientError> {
        let Some(token) = self.bearer() else {
            tracing::debug!("No token held, skipping who-am-i call");
            return Err(ClientError::Unauthenticated);
        };

        let response = self
            .client
            .get(self.url("/api/auth/me"))
            .bearer_auth(token)
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    async fn login(&self, credentials: &Credentials) -> Result<SessionUser, ClientError> {
        let response = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&LoginBody {
                id: &credentials.id,
                password: credentials.password.expose_secret(),
            })
            .send()
            .await?;

        let body: LoginResponse = check_status(response).await?.json().await?;
        self.set_token(Some(body.token));

        tracing::debug!(user_id = %body.user.id, "Logged in");
        Ok(body.user)
    }

    async fn logout(&self) -> Result<(), ClientError> {
        let token = self.bearer();
        self.set_token(None);

        let mut request = self.client.post(self.url("/api/auth/logout"));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        check_status(request.send().await?).await?;
        Ok(())
    }
}
