//! Process-wide session state.
//!
//! A [`Session`] owns the current principal and a loading flag, and
//! publishes every change on a `watch` channel. Refreshes race freely; the
//! most recently issued one decides the final state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

use crate::api::{AuthApi, Credentials, SessionUser};
use crate::error::ClientError;
use crate::guard::{Gate, Requirement, Route};

/// Snapshot of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// Signed-in user, if any.
    pub principal: Option<SessionUser>,
    /// True until the first who-am-i call resolves.
    pub is_loading: bool,
}

impl SessionState {
    /// State before the first resolution.
    #[must_use]
    pub const fn loading() -> Self {
        Self {
            principal: None,
            is_loading: true,
        }
    }

    /// A principal is present.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }

    /// The principal is `admin` or above.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.principal.as_ref().is_some_and(|p| p.role.is_admin())
    }

    /// Decide what a protected view should do.
    ///
    /// Loading always wins, so protected content is never shown before the
    /// first resolution.
    #[must_use]
    pub fn gate(&self, requirement: Requirement) -> Gate {
        if self.is_loading {
            return Gate::Loading;
        }
        if !self.is_authenticated() {
            return Gate::Redirect(Route::Login);
        }
        if requirement == Requirement::Admin && !self.is_admin() {
            return Gate::Redirect(Route::Unauthorized);
        }
        Gate::Render
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::loading()
    }
}

/// Session context object. Share it with `Arc`.
pub struct Session {
    api: Arc<dyn AuthApi>,
    state: watch::Sender<SessionState>,
    generation: AtomicU64,
}

impl Session {
    /// Create a session in the loading state.
    #[must_use]
    pub fn new(api: Arc<dyn AuthApi>) -> Self {
        let (state, _) = watch::channel(SessionState::loading());
        Self {
            api,
            state,
            generation: AtomicU64::new(0),
        }
    }

    /// Current snapshot.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every applied change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// First who-am-i call. Same as [`Session::refresh`].
    pub async fn initialize(&self) -> SessionState {
        self.refresh().await
    }

    /// Ask the server who we are and apply the answer unless a newer
    /// refresh, login or logout was issued meanwhile.
    ///
    /// Any failure clears the principal.
    pub async fn refresh(&self) -> SessionState {
        let generation = self.next_generation();

        let principal = match self.api.who_am_i().await {
            Ok(user) => Some(user),
            Err(e) if e.is_auth_failure() => None,
            Err(e) => {
                tracing::warn!(error = %e, "Session refresh failed");
                None
            }
        };

        self.resolve(generation, principal);
        self.state()
    }

    /// Log in and adopt the returned user, unless a newer refresh or
    /// logout was issued while the call was in flight.
    ///
    /// # Errors
    ///
    /// Returns the API error; the session is left unchanged.
    pub async fn login(&self, credentials: &Credentials) -> Result<SessionUser, ClientError> {
        let generation = self.next_generation();

        match self.api.login(credentials).await {
            Ok(user) => {
                self.resolve(generation, Some(user.clone()));
                Ok(user)
            }
            Err(e) => {
                self.withdraw(generation);
                Err(e)
            }
        }
    }

    /// Tear the session down. The local state is cleared even if the
    /// server call fails.
    pub async fn logout(&self) {
        let generation = self.next_generation();
        if let Err(e) = self.api.logout().await {
            tracing::warn!(error = %e, "Logout call failed");
        }
        self.resolve(generation, None);
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Give back a generation that produced nothing, so an older pending
    /// call can still settle the state.
    fn withdraw(&self, generation: u64) {
        let _ = self.generation.compare_exchange(
            generation,
            generation - 1,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    fn resolve(&self, generation: u64, principal: Option<SessionUser>) {
        self.state.send_if_modified(|state| {
            // Checked under the channel's write lock.
            if self.generation.load(Ordering::SeqCst) != generation {
                tracing::debug!(generation, "Discarding superseded session resolution");
                return false;
            }

            let changed = state.is_loading || state.principal != principal;
            state.principal = principal;
            state.is_loading = false;
            changed
        });
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &*self.state.borrow())
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Role;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    type Reply = Result<SessionUser, ClientError>;

    /// `AuthApi` whose who-am-i answers are released by the test.
    #[derive(Default)]
    struct ScriptedApi {
        pending: Mutex<VecDeque<oneshot::Receiver<Reply>>>,
        pending_logins: Mutex<VecDeque<oneshot::Receiver<Reply>>>,
        calls: AtomicUsize,
        login_calls: AtomicUsize,
    }

    impl ScriptedApi {
        /// Queue an answer slot; the returned sender releases it.
        fn expect_call(&self) -> oneshot::Sender<Reply> {
            let (tx, rx) = oneshot::channel();
            self.pending.lock().unwrap().push_back(rx);
            tx
        }

        /// Queue a login answer slot.
        fn expect_login(&self) -> oneshot::Sender<Reply> {
            let (tx, rx) = oneshot::channel();
            self.pending_logins.lock().unwrap().push_back(rx);
            tx
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AuthApi for ScriptedApi {
        async fn who_am_i(&self) -> Reply {
            let rx = self.pending.lock().unwrap().pop_front();
            self.calls.fetch_add(1, Ordering::SeqCst);
            match rx {
                Some(rx) => rx.await.unwrap_or(Err(ClientError::Unauthenticated)),
                None => Err(ClientError::Unauthenticated),
            }
        }

        async fn login(&self, credentials: &Credentials) -> Reply {
            let rx = self.pending_logins.lock().unwrap().pop_front();
            self.login_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(rx) = rx {
                return rx.await.unwrap_or(Err(ClientError::Unauthenticated));
            }
            if credentials.id == "alice" {
                Ok(user("alice", Role::User))
            } else {
                Err(ClientError::Unauthenticated)
            }
        }

        async fn logout(&self) -> Result<(), ClientError> {
            Ok(())
        }
    }

    fn user(id: &str, role: Role) -> SessionUser {
        SessionUser {
            id: id.to_string(),
            role,
            display_name: None,
            email: None,
        }
    }

    async fn wait_for_calls(api: &ScriptedApi, n: usize) {
        while api.calls() < n {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_gate() {
        let loading = SessionState::loading();
        assert_eq!(loading.gate(Requirement::Authenticated), Gate::Loading);
        assert_eq!(loading.gate(Requirement::Admin), Gate::Loading);

        let anonymous = SessionState {
            principal: None,
            is_loading: false,
        };
        assert_eq!(
            anonymous.gate(Requirement::Authenticated),
            Gate::Redirect(Route::Login)
        );
        assert_eq!(
            anonymous.gate(Requirement::Admin),
            Gate::Redirect(Route::Login)
        );

        let member = SessionState {
            principal: Some(user("alice", Role::User)),
            is_loading: false,
        };
        assert_eq!(member.gate(Requirement::Authenticated), Gate::Render);
        assert_eq!(
            member.gate(Requirement::Admin),
            Gate::Redirect(Route::Unauthorized)
        );

        for role in [Role::Admin, Role::Superadmin] {
            let admin = SessionState {
                principal: Some(user("root", role)),
                is_loading: false,
            };
            assert!(admin.is_admin());
            assert_eq!(admin.gate(Requirement::Admin), Gate::Render);
        }
    }

    #[tokio::test]
    async fn test_loading_until_first_resolution() {
        let api = Arc::new(ScriptedApi::default());
        let reply = api.expect_call();
        let session = Arc::new(Session::new(api.clone()));
        assert!(session.state().is_loading);

        let task = tokio::spawn({
            let session = session.clone();
            async move { session.initialize().await }
        });
        wait_for_calls(&api, 1).await;
        assert!(session.state().is_loading);

        reply.send(Ok(user("alice", Role::User))).unwrap();
        let state = task.await.unwrap();

        assert!(!state.is_loading);
        assert_eq!(state.principal, Some(user("alice", Role::User)));
    }

    #[tokio::test]
    async fn test_negative_resolution_clears_loading() {
        let api = Arc::new(ScriptedApi::default());
        let session = Session::new(api);

        let state = session.initialize().await;
        assert_eq!(
            state,
            SessionState {
                principal: None,
                is_loading: false
            }
        );
    }

    #[tokio::test]
    async fn test_stale_refresh_is_discarded() {
        let api = Arc::new(ScriptedApi::default());
        let first = api.expect_call();
        let second = api.expect_call();
        let session = Arc::new(Session::new(api.clone()));

        let older = tokio::spawn({
            let session = session.clone();
            async move { session.refresh().await }
        });
        let newer = tokio::spawn({
            let session = session.clone();
            async move { session.refresh().await }
        });
        wait_for_calls(&api, 2).await;
        let mut rx = session.subscribe();

        // The later-issued refresh resolves first.
        second.send(Ok(user("bob", Role::Admin))).unwrap();
        rx.changed().await.unwrap();
        first.send(Ok(user("alice", Role::User))).unwrap();
        older.await.unwrap();
        newer.await.unwrap();

        let state = session.state();
        assert_eq!(state.principal.map(|p| p.id).as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_refresh_keeps_principal_visible() {
        let api = Arc::new(ScriptedApi::default());
        let first = api.expect_call();
        let second = api.expect_call();
        let session = Arc::new(Session::new(api.clone()));

        first.send(Ok(user("alice", Role::User))).unwrap();
        session.initialize().await;

        let task = tokio::spawn({
            let session = session.clone();
            async move { session.refresh().await }
        });
        wait_for_calls(&api, 2).await;

        let during = session.state();
        assert!(!during.is_loading);
        assert!(during.is_authenticated());

        second.send(Err(ClientError::Unauthenticated)).unwrap();
        let after = task.await.unwrap();
        assert!(!after.is_authenticated());
    }

    #[tokio::test]
    async fn test_login_and_logout() {
        let api = Arc::new(ScriptedApi::default());
        let session = Session::new(api);
        let mut rx = session.subscribe();

        assert!(session.login(&Credentials::new("mallory", "x")).await.is_err());
        assert!(session.state().is_loading);

        session.login(&Credentials::new("alice", "pw1")).await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(
            rx.borrow_and_update().principal.as_ref().map(|p| p.id.as_str()),
            Some("alice")
        );

        session.logout().await;
        let state = session.state();
        assert!(!state.is_authenticated());
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn test_logout_issued_during_login_wins() {
        let api = Arc::new(ScriptedApi::default());
        let reply = api.expect_login();
        let session = Arc::new(Session::new(api.clone()));

        let login = tokio::spawn({
            let session = session.clone();
            async move { session.login(&Credentials::new("alice", "pw1")).await }
        });
        while api.login_calls.load(Ordering::SeqCst) < 1 {
            tokio::task::yield_now().await;
        }

        session.logout().await;
        assert!(!session.state().is_authenticated());

        reply.send(Ok(user("alice", Role::User))).unwrap();
        login.await.unwrap().unwrap();

        let state = session.state();
        assert!(!state.is_authenticated());
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn test_failed_login_does_not_stall_initialize() {
        let api = Arc::new(ScriptedApi::default());
        let who = api.expect_call();
        let session = Arc::new(Session::new(api.clone()));

        let init = tokio::spawn({
            let session = session.clone();
            async move { session.initialize().await }
        });
        wait_for_calls(&api, 1).await;

        assert!(session.login(&Credentials::new("mallory", "x")).await.is_err());

        who.send(Ok(user("alice", Role::User))).unwrap();
        let state = init.await.unwrap();
        assert!(!state.is_loading);
        assert_eq!(state.principal, Some(user("alice", Role::User)));
    }
}
