//! In-memory denylist of revoked token ids.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Revoked token ids, each kept until the token would have expired anyway.
#[derive(Debug, Default)]
pub struct RevocationList {
    /// `jti` -> expiry (Unix timestamp).
    entries: RwLock<HashMap<String, i64>>,
}

impl RevocationList {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke a token id until `expires_at`, pruning stale entries.
    pub fn revoke(&self, token_id: &str, expires_at: i64, now: i64) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, exp| *exp > now);
        if expires_at > now {
            entries.insert(token_id.to_string(), expires_at);
        }
    }

    /// Check whether a token id is revoked.
    #[must_use]
    pub fn is_revoked(&self, token_id: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(token_id)
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
