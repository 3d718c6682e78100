//! User model and credential store.

use std::path::Path;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use datahub_core::validation::normalize_identifier;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Key prefix for user records.
const USER_PREFIX: &str = "user:";
/// Attempts before a contended update gives up.
const MAX_CAS_RETRIES: usize = 8;

/// Credential store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Record could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Password hashing or hash parsing failed.
    #[error("Password hashing failed: {0}")]
    Hashing(String),

    /// Identifier already taken.
    #[error("User already exists: {0}")]
    Exists(String),

    /// No record for identifier.
    #[error("User not found: {0}")]
    NotFound(String),

    /// Record rejected before it reached storage.
    #[error("Invalid user: {0}")]
    Invalid(String),

    /// Concurrent writers kept invalidating an update.
    #[error("Update contended: {0}")]
    Contended(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// User role, ordered `User < Admin < Superadmin`.
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
    /// Check if this role has admin privileges (`admin` or above).
    #[must_use]
    pub fn is_admin(self) -> bool {
        self >= Self::Admin
    }

    /// Lowercase role name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
            Self::Superadmin => "superadmin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a role name.
#[derive(Debug, Error)]
#[error("Unknown role: {0}")]
pub struct ParseRoleError(String);

impl std::str::FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            "superadmin" => Ok(Self::Superadmin),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

/// User record as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique, normalized identifier.
    pub id: String,
    /// Argon2 password hash (PHC string). Never leaves the server.
    pub password_hash: String,
    /// User role.
    pub role: Role,
    /// Optional display name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Optional email address.
    #[serde(default)]
    pub email: Option<String>,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user last logged in.
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    /// Create a new user with the given credentials.
    ///
    /// The identifier is normalized.
    ///
    /// # Errors
    ///
    /// Returns error if password hashing fails.
    pub fn new(id: &str, password: &str, role: Role) -> Result<Self, StoreError> {
        Ok(Self {
            id: normalize_identifier(id),
            password_hash: hash_password(password)?,
            role,
            display_name: None,
            email: None,
            created_at: Utc::now(),
            last_login: None,
        })
    }

    /// Check a password against this user's hash.
    ///
    /// # Errors
    ///
    /// Returns error only if the stored hash is malformed; a wrong
    /// password is `Ok(false)`.
    pub fn verify_password(&self, password: &str) -> Result<bool, StoreError> {
        verify_password(password, &self.password_hash)
    }

    /// Public view of the user (no password hash).
    #[must_use]
    pub fn to_public(&self) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            role: self.role,
            display_name: self.display_name.clone(),
            email: self.email.clone(),
            created_at: self.created_at,
            last_login: self.last_login,
        }
    }
}

/// Public user representation (for API responses).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUser {
    /// Unique identifier.
    pub id: String,
    /// User role.
    pub role: Role,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// When created.
    pub created_at: DateTime<Utc>,
    /// Last login time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}

/// User store backed by sled.
///
/// Each record is written with compare-and-swap, so creates and
/// read-modify-write updates are atomic per identifier.
pub struct UserStore {
    tree: sled::Tree,
}

impl UserStore {
    /// Open or create a user store under `path`.
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path.join("auth"))?;
        Self::with_db(&db)
    }

    /// Create a user store on an existing sled database.
    ///
    /// # Errors
    ///
    /// Returns error if tree cannot be opened.
    pub fn with_db(db: &sled::Db) -> Result<Self, StoreError> {
        let tree = db.open_tree("users")?;
        Ok(Self { tree })
    }

    fn key(id: &str) -> Vec<u8> {
        format!("{USER_PREFIX}{}", normalize_identifier(id)).into_bytes()
    }

    fn decode(bytes: &[u8]) -> Result<User, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn encode(user: &User) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(user).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Check if any users exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.scan_prefix(USER_PREFIX).next().is_none()
    }

    /// Count total users.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Storage` if the scan fails.
    pub fn count(&self) -> Result<usize, StoreError> {
        self.tree
            .scan_prefix(USER_PREFIX)
            .try_fold(0, |n, entry| entry.map(|_| n + 1))
            .map_err(StoreError::from)
    }

    /// Insert a new user.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Exists` if the identifier is taken, even when
    /// two creates race.
    pub fn create(&self, user: &User) -> Result<(), StoreError> {
        let value = Self::encode(user)?;

        self.tree
            .compare_and_swap(Self::key(&user.id), None::<&[u8]>, Some(value))?
            .map_err(|_| StoreError::Exists(user.id.clone()))?;

        self.tree.flush()?;
        Ok(())
    }

    /// Get a user by identifier.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn get(&self, id: &str) -> Result<Option<User>, StoreError> {
        self.tree
            .get(Self::key(id))?
            .map(|value| Self::decode(&value))
            .transpose()
    }

    /// Atomically read, modify and write one user record.
    ///
    /// `apply` may run more than once if another writer changes the record
    /// in between; it sees the latest stored value each time.
    ///
    /// # Errors
    ///
    /// Returns whatever `apply` returns, `NotFound` if the record is
    /// absent, or `Contended` after repeated conflicts.
    pub fn update<E, F>(&self, id: &str, mut apply: F) -> Result<User, E>
    where
        E: From<StoreError>,
        F: FnMut(&mut User) -> Result<(), E>,
    {
        let key = Self::key(id);

        for _ in 0..MAX_CAS_RETRIES {
            let current = self
                .tree
                .get(&key)
                .map_err(StoreError::from)?
                .ok_or_else(|| StoreError::NotFound(normalize_identifier(id)))?;

            let mut user = Self::decode(&current)?;
            apply(&mut user)?;
            // Identifiers are immutable.
            user.id = normalize_identifier(id);
            let value = Self::encode(&user)?;

            let swapped = self
                .tree
                .compare_and_swap(&key, Some(&current), Some(value))
                .map_err(StoreError::from)?;

            if swapped.is_ok() {
                self.tree.flush().map_err(StoreError::from)?;
                return Ok(user);
            }

            tracing::debug!(user_id = %user.id, "Concurrent update detected, retrying");
        }

        Err(StoreError::Contended(normalize_identifier(id)).into())
    }

    /// Replace a user's password.
    ///
    /// # Errors
    ///
    /// Returns error if hashing fails, the user is missing, or storage fails.
    pub fn set_password(&self, id: &str, password: &str) -> Result<User, StoreError> {
        let hash = hash_password(password)?;
        self.update(id, |user| {
            user.password_hash.clone_from(&hash);
            Ok::<_, StoreError>(())
        })
    }

    /// Change a user's role.
    ///
    /// Tokens already issued keep the role they were issued with.
    ///
    /// # Errors
    ///
    /// Returns error if the user is missing or storage fails.
    pub fn set_role(&self, id: &str, role: Role) -> Result<User, StoreError> {
        self.update(id, |user| {
            user.role = role;
            Ok::<_, StoreError>(())
        })
    }

    /// Stamp the last login time.
    ///
    /// # Errors
    ///
    /// Returns error if the user is missing or storage fails.
    pub fn touch_last_login(&self, id: &str) -> Result<User, StoreError> {
        self.update(id, |user| {
            user.last_login = Some(Utc::now());
            Ok::<_, StoreError>(())
        })
    }

    /// Delete a user.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let removed = self.tree.remove(Self::key(id))?.is_some();
        self.tree.flush()?;
        Ok(removed)
    }

    /// List all users, ordered by identifier.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn list(&self) -> Result<Vec<User>, StoreError> {
        self.tree
            .scan_prefix(USER_PREFIX)
            .map(|entry| {
                let (_, value) = entry?;
                Self::decode(&value)
            })
            .collect()
    }

    /// Count users holding exactly `role`.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub fn count_role(&self, role: Role) -> Result<usize, StoreError> {
        Ok(self.list()?.iter().filter(|u| u.role == role).count())
    }
}

impl std::fmt::Debug for UserStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserStore")
            .field("users", &self.count().ok())
            .finish()
    }
}

/// Hash a password using Argon2id.
pub(crate) fn hash_password(password: &str) -> Result<String, StoreError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| StoreError::Hashing(e.to_string()))
}

/// Verify a password against a hash.
pub(crate) fn verify_password(password: &str, hash: &str) -> Result<bool, StoreError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| StoreError::Hashing(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
