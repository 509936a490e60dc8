//! User record storage.
//!
//! [`CredentialStore`] is the seam between the password verifier and
//! wherever user records live. [`InMemoryCredentialStore`] keeps them for
//! the process lifetime.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::errors::AuthError;

/// A registered user. Immutable once stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserRecord {
    /// Unique, case-sensitive login name.
    pub username: String,
    /// bcrypt hash of the password.
    pub password_hash: String,
}

/// Storage for user records.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up a user by exact username.
    async fn get(&self, username: &str) -> Option<UserRecord>;

    /// Insert a new record. Fails with [`AuthError::AlreadyExists`] if the
    /// username is taken; the existing record is left untouched.
    async fn insert(&self, record: UserRecord) -> Result<(), AuthError>;

    /// Number of stored users.
    async fn user_count(&self) -> usize;
}

/// Process-lifetime credential store.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    users: RwLock<HashMap<String, UserRecord>>,
}

impl InMemoryCredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store preloaded with records. Later duplicates are skipped.
    pub fn with_users(records: impl IntoIterator<Item = UserRecord>) -> Self {
        let mut users = HashMap::new();
        for record in records {
            if users.contains_key(&record.username) {
                tracing::warn!(username = %record.username, "duplicate seed user skipped");
                continue;
            }
            let _ = users.insert(record.username.clone(), record);
        }
        Self {
            users: RwLock::new(users),
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get(&self, username: &str) -> Option<UserRecord> {
        self.users.read().get(username).cloned()
    }

    async fn insert(&self, record: UserRecord) -> Result<(), AuthError> {
        match self.users.write().entry(record.username.clone()) {
            Entry::Occupied(_) => Err(AuthError::AlreadyExists(record.username)),
            Entry::Vacant(slot) => {
                let _ = slot.insert(record);
                Ok(())
            }
        }
    }

    async fn user_count(&self) -> usize {
        self.users.read().len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
