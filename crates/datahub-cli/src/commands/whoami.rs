//! Whoami command: resolve the session against a running gateway.

use std::sync::Arc;

use anyhow::Result;
use datahub_client::{Gate, HttpAuthApi, Requirement, Session, SessionState};

use crate::ui;

/// Whoami command arguments.
#[derive(Debug, Clone)]
pub struct WhoamiArgs {
    /// Gateway base URL.
    pub url: String,
    /// Token to present.
    pub token: Option<String>,
    /// Also check admin access.
    pub admin: bool,
}

/// Run one session resolution and print the outcome.
///
/// # Errors
///
/// Returns error if the URL is invalid.
pub async fn run_whoami(args: WhoamiArgs) -> Result<()> {
    let api = match args.token {
        Some(token) => HttpAuthApi::with_token(&args.url, token)?,
        None => HttpAuthApi::new(&args.url)?,
    };

    let session = Session::new(Arc::new(api));
    let state = session.initialize().await;

    report(&state, if args.admin { Requirement::Admin } else { Requirement::Authenticated });
    Ok(())
}

fn report(state: &SessionState, requirement: Requirement) {
    if let Some(user) = &state.principal {
        ui::success(&format!("Signed in as '{}'", user.id));
        ui::kv("Role", &user.role.to_string());
        if let Some(name) = &user.display_name {
            ui::kv("Name", name);
        }
        if let Some(email) = &user.email {
            ui::kv("Email", email);
        }
    }

    match state.gate(requirement) {
        Gate::Render => ui::info("Access granted"),
        Gate::Redirect(route) => ui::warning(&format!("Access denied, redirect to {}", route.path())),
        Gate::Loading => ui::info("Session still loading"),
    }
}
