//! Gating of protected views.

use std::sync::{Arc, Mutex, PoisonError};

use crate::session::SessionState;

/// What a protected view requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Any signed-in user.
    Authenticated,
    /// `admin` or above.
    Admin,
}

/// Redirect targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Login view.
    Login,
    /// Shown to signed-in users lacking a role.
    Unauthorized,
}

impl Route {
    /// Path of the view.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Login => "/login",
            Self::Unauthorized => "/unauthorized",
        }
    }
}

/// Outcome of gating a protected view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Show the neutral loading state only.
    Loading,
    /// Render nothing and navigate away.
    Redirect(Route),
    /// Render the protected content.
    Render,
}

/// Performs navigation for a [`ProtectedShell`].
pub trait Navigator: Send + Sync {
    /// Navigate to `route`.
    fn redirect(&self, route: Route);
}

/// Wraps protected content and applies the session gate to it.
///
/// Re-rendering with an unchanged outcome does not redirect again.
pub struct ProtectedShell {
    requirement: Requirement,
    navigator: Arc<dyn Navigator>,
    last_redirect: Mutex<Option<Route>>,
}

impl ProtectedShell {
    /// Shell with the given requirement.
    #[must_use]
    pub fn new(requirement: Requirement, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            requirement,
            navigator,
            last_redirect: Mutex::new(None),
        }
    }

    /// Gate `content` against `state`.
    ///
    /// Returns the rendered content only for [`Gate::Render`]; `content`
    /// is not called otherwise.
    pub fn render<T>(&self, state: &SessionState, content: impl FnOnce() -> T) -> Option<T> {
        let gate = state.gate(self.requirement);
        let mut last = self
            .last_redirect
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match gate {
            Gate::Loading => None,
            Gate::Redirect(route) => {
                if *last != Some(route) {
                    *last = Some(route);
                    drop(last);
                    tracing::debug!(path = route.path(), "Redirecting from protected view");
                    self.navigator.redirect(route);
                }
                None
            }
            Gate::Render => {
                *last = None;
                drop(last);
                Some(content())
            }
        }
    }
}

impl std::fmt::Debug for ProtectedShell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtectedShell")
            .field("requirement", &self.requirement)
            .finish_non_exhaustive()
    }
}
