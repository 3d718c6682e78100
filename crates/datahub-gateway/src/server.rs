//! Gateway server: REST routes over the auth controller.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{FromRef, State, rejection::JsonRejection},
    http::{
        HeaderValue, StatusCode,
        header::{CONTENT_LENGTH, CONTENT_TYPE, SET_COOKIE},
    },
    middleware::map_response,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use datahub_core::{
    Config, ServerConfig,
    validation::{limits, normalize_identifier},
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::GatewayError;
use crate::auth::{
    Ack, ApiError, AppError, AuthController, AuthResponse, AuthState, ChangePasswordRequest,
    LoginRequest, OptionalAuth, PublicUser, RegisterRequest, RequireAdmin, RequireAuth,
    setup::auto_setup_from_env,
};
use crate::middleware::LoginRateLimiter;

/// State shared across handlers.
#[derive(Debug, Clone)]
pub struct GatewayState {
    /// Authentication state.
    pub auth: Arc<AuthState>,
    /// Login attempt limiter.
    pub login_limiter: Arc<LoginRateLimiter>,
}

impl GatewayState {
    /// Wrap auth state, sizing the login limiter from its config.
    #[must_use]
    pub fn new(auth: Arc<AuthState>) -> Self {
        let login_limiter = Arc::new(LoginRateLimiter::new(
            auth.config.login_attempts_per_minute,
        ));
        Self {
            auth,
            login_limiter,
        }
    }
}

impl FromRef<GatewayState> for Arc<AuthState> {
    fn from_ref(state: &GatewayState) -> Self {
        state.auth.clone()
    }
}

/// Build the API router.
pub fn router(state: GatewayState, config: &ServerConfig) -> Router {
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/logout", post(logout_handler))
        .route("/api/auth/me", get(me_handler))
        .route("/api/auth/password", post(change_password_handler))
        .route("/api/users", get(list_users_handler))
        .fallback(not_found_handler)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(map_response(error_body))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    Duration::from_secs(config.timeout_secs),
                )),
        );

    if config.cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Gateway server.
#[derive(Debug)]
pub struct Gateway {
    config: ServerConfig,
    state: GatewayState,
}

impl Gateway {
    /// Open the credential store, build the token service and run the
    /// first-run bootstrap.
    ///
    /// # Errors
    ///
    /// Returns error if the data directory or auth state cannot be set up.
    pub fn new(config: Config) -> Result<Self, GatewayError> {
        let data_dir = config.data_dir();
        std::fs::create_dir_all(&data_dir)
            .map_err(|e| GatewayError::Config(format!("Failed to create data dir: {e}")))?;

        let auth = AuthState::initialize(config.auth, &data_dir)
            .map_err(|e| GatewayError::Config(format!("Auth init failed: {e}")))?;

        match auto_setup_from_env(&auth.users) {
            Ok(Some(admin)) => tracing::info!(user_id = %admin.id, "Bootstrapped superadmin from environment"),
            Ok(None) if auth.users.is_empty() => tracing::warn!(
                "No users configured. Set DATAHUB_ADMIN_USERNAME and DATAHUB_ADMIN_PASSWORD, \
                 or run `datahub admin create`"
            ),
            Ok(None) => {}
            Err(e) => tracing::warn!("Auto-setup from env failed: {}", e),
        }

        Ok(Self::with_state(config.server, GatewayState::new(Arc::new(auth))))
    }

    /// Create a gateway over existing state.
    #[must_use]
    pub const fn with_state(config: ServerConfig, state: GatewayState) -> Self {
        Self { config, state }
    }

    /// Shared state.
    #[must_use]
    pub const fn state(&self) -> &GatewayState {
        &self.state
    }

    /// Bind the configured address and serve until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns error if binding or serving fails.
    pub async fn run(&self) -> Result<(), GatewayError> {
        let addr = self.config.address();
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!("Gateway API listening on http://{}", addr);

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns error if the server fails.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = router(self.state.clone(), &self.config);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| GatewayError::Server(e.to_string()))?;

        tracing::info!("Gateway stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Run a controller operation off the async runtime; password hashing is CPU-bound.
async fn with_controller<T, F>(auth: Arc<AuthState>, op: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce(AuthController<'_>) -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || op(auth.controller()))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Auth task failed");
            AppError::internal()
        })?
        .map_err(AppError::from)
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ApiError::Validation(e.body_text()).into())
}

fn session_cookie(auth: &AuthState, response: &AuthResponse) -> Result<HeaderValue, AppError> {
    let max_age = auth.tokens.validity().as_secs();
    HeaderValue::from_str(&format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age}",
        auth.config.cookie_name, response.token
    ))
    .map_err(|_| AppError::internal())
}

fn cleared_cookie(auth: &AuthState) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(&format!(
        "{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0",
        auth.config.cookie_name
    ))
    .map_err(|_| AppError::internal())
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn not_found_handler() -> AppError {
    AppError::new(StatusCode::NOT_FOUND, "Not found")
}

/// Give bodiless error responses from layers (timeouts, 405s) the
/// standard `{"error": ..}` shape.
async fn error_body(response: Response) -> Response {
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error())
        || response.headers().contains_key(CONTENT_TYPE)
    {
        return response;
    }

    let (parts, _) = response.into_parts();
    let message = status.canonical_reason().unwrap_or("Request failed");
    let mut replaced = AppError::new(status, message).into_response();
    let own: Vec<_> = replaced.headers().keys().cloned().collect();
    for (name, value) in &parts.headers {
        if *name != CONTENT_LENGTH && !own.contains(name) {
            replaced.headers_mut().append(name.clone(), value.clone());
        }
    }
    replaced
}

async fn login_handler(
    State(state): State<GatewayState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = json_body(payload)?;

    let key = normalize_identifier(&request.id);
    if key.chars().count() > limits::MAX_IDENTIFIER_LENGTH {
        // No account can have this identifier; keep it out of the limiter.
        return Err(ApiError::Unauthenticated.into());
    }
    if !state.login_limiter.check(&key) {
        tracing::warn!(user_id = %request.id, "Login rate limit exceeded");
        return Err(AppError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many login attempts",
        ));
    }

    let response = with_controller(state.auth.clone(), move |c| c.login(&request)).await?;
    let cookie = session_cookie(&state.auth, &response)?;

    Ok(([(SET_COOKIE, cookie)], Json(response)).into_response())
}

async fn register_handler(
    State(state): State<GatewayState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = json_body(payload)?;

    let response = with_controller(state.auth.clone(), move |c| c.register(&request)).await?;
    let cookie = session_cookie(&state.auth, &response)?;

    Ok((
        StatusCode::CREATED,
        [(SET_COOKIE, cookie)],
        Json(response),
    )
        .into_response())
}

async fn logout_handler(
    State(state): State<GatewayState>,
    OptionalAuth(principal): OptionalAuth,
) -> Result<Response, AppError> {
    let ack = state.auth.controller().logout(principal.as_ref());
    let cookie = cleared_cookie(&state.auth)?;

    Ok(([(SET_COOKIE, cookie)], Json(ack)).into_response())
}

async fn me_handler(
    State(state): State<GatewayState>,
    RequireAuth(principal): RequireAuth,
) -> Result<Json<PublicUser>, AppError> {
    Ok(Json(state.auth.controller().get_me(&principal)?))
}

async fn change_password_handler(
    State(state): State<GatewayState>,
    RequireAuth(principal): RequireAuth,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<Ack>, AppError> {
    let request = json_body(payload)?;

    let ack = with_controller(state.auth.clone(), move |c| {
        c.change_password(&principal, &request)
    })
    .await?;

    Ok(Json(ack))
}

async fn list_users_handler(
    State(state): State<GatewayState>,
    RequireAdmin(principal): RequireAdmin,
) -> Result<Json<Vec<PublicUser>>, AppError> {
    tracing::debug!(user_id = %principal.user_id, "Listing users");
    Ok(Json(state.auth.controller().list_users()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Role, TokenService, User, UserStore};
    use axum::{
        body::Body,
        http::{Request, header},
    };
    use datahub_core::AuthConfig;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_state(config: AuthConfig) -> (TempDir, GatewayState) {
        let temp_dir = TempDir::new().unwrap();
        let users = UserStore::open(temp_dir.path()).unwrap();
        let tokens = TokenService::new(&TokenService::generate_secret(), config.token_expiry());
        let auth = Arc::new(AuthState::new(config, tokens, users));
        (temp_dir, GatewayState::new(auth))
    }

    fn lenient() -> AuthConfig {
        AuthConfig::builder().min_password_length(3).build()
    }

    fn app(state: &GatewayState) -> Router {
        router(state.clone(), &ServerConfig::default())
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_with_token(uri: &str, token: &str) -> Request<Body> {
        Request::get(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn register(state: &GatewayState, id: &str, password: &str) -> String {
        let response = app(state)
            .oneshot(post_json(
                "/api/auth/register",
                &json!({ "id": id, "password": password }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, state) = test_state(lenient());
        let response = app(&state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_and_method_use_error_shape() {
        let (_dir, state) = test_state(lenient());

        let response = app(&state)
            .oneshot(Request::get("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await, json!({ "error": "Not found" }));

        let response = app(&state)
            .oneshot(Request::get("/api/auth/login").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(response.headers().contains_key(header::ALLOW));
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Method Not Allowed" })
        );
    }

    #[tokio::test]
    async fn test_timeout_uses_error_shape() {
        let response = error_body(StatusCode::REQUEST_TIMEOUT.into_response()).await;
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Request Timeout" })
        );

        // Handler errors already carry a body and pass through untouched.
        let response = error_body(AppError::new(StatusCode::CONFLICT, "taken").into_response()).await;
        assert_eq!(body_json(response).await, json!({ "error": "taken" }));
    }

    #[tokio::test]
    async fn test_register_login_me() {
        let (_dir, state) = test_state(lenient());
        register(&state, "alice", "pw1").await;

        let response = app(&state)
            .oneshot(post_json(
                "/api/auth/login",
                &json!({ "id": "alice", "password": "pw1" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(cookie.starts_with("datahub_token="));
        assert!(cookie.contains("HttpOnly"));

        let body = body_json(response).await;
        assert_eq!(body["user"]["id"], "alice");
        assert_eq!(body["user"]["role"], "user");
        assert!(body["user"].get("password_hash").is_none());
        let token = body["token"].as_str().unwrap();

        let me = app(&state)
            .oneshot(get_with_token("/api/auth/me", token))
            .await
            .unwrap();
        assert_eq!(me.status(), StatusCode::OK);
        assert_eq!(body_json(me).await["id"], "alice");
    }

    #[tokio::test]
    async fn test_me_with_cookie() {
        let (_dir, state) = test_state(lenient());
        let token = register(&state, "alice", "pw1").await;

        let request = Request::get("/api/auth/me")
            .header(header::COOKIE, format!("datahub_token={token}"))
            .body(Body::empty())
            .unwrap();
        let response = app(&state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_me_without_token() {
        let (_dir, state) = test_state(lenient());
        let response = app(&state)
            .oneshot(Request::get("/api/auth/me").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Not authenticated" })
        );
    }

    #[tokio::test]
    async fn test_bad_login_is_401() {
        let (_dir, state) = test_state(lenient());
        register(&state, "alice", "pw1").await;

        for body in [
            json!({ "id": "alice", "password": "wrong" }),
            json!({ "id": "nobody", "password": "pw1" }),
        ] {
            let response = app(&state)
                .oneshot(post_json("/api/auth/login", &body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(
                body_json(response).await,
                json!({ "error": "Not authenticated" })
            );
        }
    }

    #[tokio::test]
    async fn test_duplicate_register_is_400() {
        let (_dir, state) = test_state(lenient());
        register(&state, "alice", "pw1").await;

        let response = app(&state)
            .oneshot(post_json(
                "/api/auth/register",
                &json!({ "id": "alice", "password": "pw2" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_json_is_400() {
        let (_dir, state) = test_state(lenient());
        let request = Request::post("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let response = app(&state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_users_requires_admin() {
        let (_dir, state) = test_state(lenient());
        let token = register(&state, "alice", "pw1").await;

        let response = app(&state)
            .oneshot(get_with_token("/api/users", &token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await, json!({ "error": "Access denied" }));

        let response = app(&state)
            .oneshot(Request::get("/api/users").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_promotion_needs_new_token() {
        let (_dir, state) = test_state(lenient());
        let stale = register(&state, "alice", "pw1").await;
        state.auth.users.set_role("alice", Role::Admin).unwrap();

        // The old token still carries the old role.
        let response = app(&state)
            .oneshot(get_with_token("/api/users", &stale))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app(&state)
            .oneshot(post_json(
                "/api/auth/login",
                &json!({ "id": "alice", "password": "pw1" }),
            ))
            .await
            .unwrap();
        let fresh = body_json(response).await["token"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app(&state)
            .oneshot(get_with_token("/api/users", &fresh))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let users = body_json(response).await;
        assert_eq!(users.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_change_password() {
        let (_dir, state) = test_state(lenient());
        let token = register(&state, "alice", "pw1").await;

        let request = Request::post("/api/auth/password")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "current_password": "nope", "new_password": "pw2" }).to_string(),
            ))
            .unwrap();
        let response = app(&state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let request = Request::post("/api/auth/password")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "current_password": "pw1", "new_password": "pw2" }).to_string(),
            ))
            .unwrap();
        let response = app(&state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let user = state.auth.users.get("alice").unwrap().unwrap();
        assert!(user.verify_password("pw2").unwrap());
    }

    #[tokio::test]
    async fn test_logout_clears_cookie() {
        let (_dir, state) = test_state(lenient());
        let response = app(&state)
            .oneshot(Request::post("/api/auth/logout").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.contains("Max-Age=0"));
        assert_eq!(body_json(response).await, json!({ "success": true }));
    }

    #[tokio::test]
    async fn test_login_rate_limited() {
        let config = AuthConfig::builder()
            .min_password_length(3)
            .login_attempts_per_minute(2)
            .build();
        let (_dir, state) = test_state(config);
        state
            .auth
            .users
            .create(&User::new("alice", "pw1", Role::User).unwrap())
            .unwrap();

        let attempt = json!({ "id": "alice", "password": "wrong" });
        for _ in 0..2 {
            let response = app(&state)
                .oneshot(post_json("/api/auth/login", &attempt))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }

        let response = app(&state)
            .oneshot(post_json("/api/auth/login", &attempt))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_oversized_login_id_is_not_tracked() {
        let (_dir, state) = test_state(lenient());

        let id = "x".repeat(limits::MAX_IDENTIFIER_LENGTH + 1);
        let response = app(&state)
            .oneshot(post_json(
                "/api/auth/login",
                &json!({ "id": id, "password": "whatever" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(state.login_limiter.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn test_serve_and_shutdown() {
        let (_dir, state) = test_state(lenient());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let gateway = Gateway::with_state(ServerConfig::default(), state);

        gateway.serve(listener, async {}).await.unwrap();
    }
}
