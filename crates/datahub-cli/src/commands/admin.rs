//! Admin user management commands.
//!
//! These operate on the credential store directly, so they work while the
//! server is stopped. Role changes reach users at their next login.

use std::path::PathBuf;

use anyhow::{Context, bail};
use datahub_core::PasswordPolicy;
use datahub_core::validation::{validate_identifier, validate_password};
use datahub_gateway::auth::{Role, User, UserStore, setup::generate_password};

use crate::ui;

/// Length of generated passwords.
const GENERATED_PASSWORD_LENGTH: usize = 20;

/// Arguments for admin commands.
pub struct AdminArgs {
    /// The admin action to perform.
    pub action: AdminAction,
    /// Directory holding the credential store.
    pub data_dir: PathBuf,
    /// Password rules for new passwords.
    pub policy: PasswordPolicy,
}

/// Admin actions.
pub enum AdminAction {
    /// Create a new user.
    Create {
        username: String,
        password: Option<String>,
        role: Role,
        generate_password: bool,
    },
    /// List all users.
    List,
    /// Change a user's role.
    SetRole { username: String, role: Role },
    /// Replace a user's password with a generated one.
    ResetPassword { username: String },
    /// Delete a user.
    Delete { username: String },
}

/// Run the admin command.
///
/// # Errors
///
/// Returns error if the operation fails.
pub fn run_admin(args: AdminArgs) -> anyhow::Result<()> {
    std::fs::create_dir_all(&args.data_dir)?;

    let store = UserStore::open(&args.data_dir).context("Failed to open user store")?;

    match args.action {
        AdminAction::Create {
            username,
            password,
            role,
            generate_password: gen_pwd,
        } => {
            let password = match (password, gen_pwd) {
                (_, true) => {
                    let pwd = generate_password(GENERATED_PASSWORD_LENGTH);
                    ui::success(&format!("Generated password: {pwd}"));
                    pwd
                }
                (Some(password), false) => password,
                (None, false) => bail!("Password required. Use --password or --generate-password"),
            };
            let user = create_user(&store, &username, &password, role, args.policy)?;
            ui::success(&format!("Created user '{}' with role '{}'", user.id, user.role));
        }
        AdminAction::List => list_users(&store)?,
        AdminAction::SetRole { username, role } => {
            let user = set_role(&store, &username, role)?;
            ui::success(&format!("User '{}' is now '{}'", user.id, user.role));
            ui::info("Existing tokens keep their old role until the user logs in again");
        }
        AdminAction::ResetPassword { username } => {
            let new_password = generate_password(GENERATED_PASSWORD_LENGTH);
            store
                .set_password(&username, &new_password)
                .with_context(|| format!("Failed to reset password for '{username}'"))?;
            ui::success(&format!("Password reset for user '{username}'"));
            ui::success(&format!("New password: {new_password}"));
        }
        AdminAction::Delete { username } => {
            delete_user(&store, &username)?;
            ui::success(&format!("Deleted user '{username}'"));
        }
    }

    Ok(())
}

fn create_user(
    store: &UserStore,
    username: &str,
    password: &str,
    role: Role,
    policy: PasswordPolicy,
) -> anyhow::Result<User> {
    let id = validate_identifier(username)?;
    validate_password(password, policy)?;

    let user = User::new(&id, password, role).context("Failed to create user")?;
    store.create(&user).context("Failed to save user")?;
    Ok(user)
}

fn list_users(store: &UserStore) -> anyhow::Result<()> {
    let users = store.list().context("Failed to list users")?;

    if users.is_empty() {
        ui::info("No users configured.");
        ui::info(
            "Run 'datahub admin create --username admin --role superadmin --generate-password' to create one.",
        );
        return Ok(());
    }

    ui::info(&format!("Users ({}):", users.len()));
    println!();
    println!("{:<24} {:<12} {:<20} {:<20}", "ID", "ROLE", "CREATED", "LAST LOGIN");
    println!("{}", "-".repeat(78));

    for user in users {
        let created = user.created_at.format("%Y-%m-%d %H:%M:%S").to_string();
        let last_login = user.last_login.map_or_else(
            || "never".to_string(),
            |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
        );
        println!(
            "{:<24} {:<12} {:<20} {:<20}",
            user.id,
            user.role.as_str(),
            created,
            last_login
        );
    }

    Ok(())
}

/// Fail if `user` is the only superadmin left.
fn ensure_not_last_superadmin(store: &UserStore, user: &User) -> anyhow::Result<()> {
    if user.role == Role::Superadmin && store.count_role(Role::Superadmin)? <= 1 {
        bail!("Cannot remove the last superadmin");
    }
    Ok(())
}

fn set_role(store: &UserStore, username: &str, role: Role) -> anyhow::Result<User> {
    let user = store
        .get(username)?
        .with_context(|| format!("User not found: {username}"))?;

    if role != Role::Superadmin {
        ensure_not_last_superadmin(store, &user)?;
    }

    Ok(store.set_role(&user.id, role)?)
}

fn delete_user(store: &UserStore, username: &str) -> anyhow::Result<()> {
    let user = store
        .get(username)?
        .with_context(|| format!("User not found: {username}"))?;

    ensure_not_last_superadmin(store, &user)?;

    store.delete(&user.id).context("Failed to delete user")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, UserStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = UserStore::open(temp_dir.path()).unwrap();
        (temp_dir, store)
    }

    #[test]
    fn test_create_user() {
        let (_dir, store) = open_store();
        let user = create_user(
            &store,
            "Root",
            "long enough",
            Role::Superadmin,
            PasswordPolicy::default(),
        )
        .unwrap();

        assert_eq!(user.id, "root");
        assert_eq!(store.get("root").unwrap().unwrap().role, Role::Superadmin);
    }

    #[test]
    fn test_create_user_enforces_policy() {
        let (_dir, store) = open_store();
        assert!(create_user(&store, "alice", "short", Role::User, PasswordPolicy::default()).is_err());
        assert!(create_user(&store, "bad id", "long enough", Role::User, PasswordPolicy::default()).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_cannot_delete_last_superadmin() {
        let (_dir, store) = open_store();
        let policy = PasswordPolicy::default();
        create_user(&store, "root", "long enough", Role::Superadmin, policy).unwrap();
        create_user(&store, "alice", "long enough", Role::Admin, policy).unwrap();

        assert!(delete_user(&store, "root").is_err());
        assert!(set_role(&store, "root", Role::Admin).is_err());

        delete_user(&store, "alice").unwrap();
        assert!(store.get("alice").unwrap().is_none());

        create_user(&store, "root2", "long enough", Role::Superadmin, policy).unwrap();
        delete_user(&store, "root").unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_set_role() {
        let (_dir, store) = open_store();
        create_user(&store, "alice", "long enough", Role::User, PasswordPolicy::default()).unwrap();

        let user = set_role(&store, "ALICE", Role::Admin).unwrap();
        assert_eq!(user.role, Role::Admin);
        assert!(set_role(&store, "ghost", Role::Admin).is_err());
    }
}
