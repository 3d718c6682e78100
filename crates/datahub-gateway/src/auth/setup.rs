//! First-run bootstrap of the initial superadmin.

use datahub_core::validation::validate_identifier;
use rand::RngCore;

use super::users::{Role, StoreError, User, UserStore};

/// Env var naming the bootstrap superadmin.
pub const ADMIN_USERNAME_ENV: &str = "DATAHUB_ADMIN_USERNAME";
/// Env var holding the bootstrap superadmin's password.
pub const ADMIN_PASSWORD_ENV: &str = "DATAHUB_ADMIN_PASSWORD";

/// Create a superadmin if the store is empty.
///
/// Returns `None` when users already exist, so a restart never
/// overwrites anything.
///
/// # Errors
///
/// Returns error if the identifier is invalid or user creation fails.
pub fn bootstrap_superadmin(
    user_store: &UserStore,
    id: &str,
    password: &str,
) -> Result<Option<User>, StoreError> {
    if !user_store.is_empty() {
        return Ok(None);
    }

    let id = validate_identifier(id).map_err(|e| StoreError::Invalid(e.to_string()))?;
    let admin = User::new(&id, password, Role::Superadmin)?;

    match user_store.create(&admin) {
        Ok(()) => {}
        // Lost a race with another bootstrap.
        Err(StoreError::Exists(_)) => return Ok(None),
        Err(e) => return Err(e),
    }

    tracing::info!(user_id = %admin.id, "Superadmin created");
    Ok(Some(admin))
}

/// Auto-setup from environment variables.
///
/// Reads `DATAHUB_ADMIN_USERNAME` and `DATAHUB_ADMIN_PASSWORD` and creates a
/// superadmin if both are set and no users exist.
///
/// # Errors
///
/// Returns error if user creation fails.
pub fn auto_setup_from_env(user_store: &UserStore) -> Result<Option<User>, StoreError> {
    let username = match std::env::var(ADMIN_USERNAME_ENV) {
        Ok(u) if !u.trim().is_empty() => u,
        _ => return Ok(None),
    };

    let password = match std::env::var(ADMIN_PASSWORD_ENV) {
        Ok(p) if !p.is_empty() => p,
        _ => return Ok(None),
    };

    bootstrap_superadmin(user_store, &username, &password)
}

/// Generate a secure random password.
#[must_use]
pub fn generate_password(length: usize) -> String {
    const CHARSET: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";
    let mut rng = rand::thread_rng();

    (0..length)
        .map(|_| {
            let idx = (rng.next_u32() as usize) % CHARSET.len();
            char::from(CHARSET[idx])
        })
        .collect()
}
