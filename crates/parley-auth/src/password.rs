//! bcrypt password hashing and the [`PasswordVerifier`].
//!
//! Hashing is deliberately slow, so every hash or verify call runs on the
//! blocking pool via [`tokio::task::spawn_blocking`].

use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::AuthError;
use crate::store::{CredentialStore, UserRecord};

/// bcrypt work factor used when none is configured.
pub const DEFAULT_COST: u32 = bcrypt::DEFAULT_COST;

/// Plaintext hashed once at startup so unknown-user lookups cost the same
/// as a real verification.
const TIMING_DUMMY_PASSWORD: &str = "parley::no-such-user";

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    Ok(bcrypt::hash(password, cost)?)
}

/// Check a password against a stored bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    Ok(bcrypt::verify(password, hash)?)
}

async fn run_blocking<T, F>(f: F) -> Result<T, AuthError>
where
    F: FnOnce() -> Result<T, AuthError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

/// Registers users and checks their passwords against a [`CredentialStore`].
pub struct PasswordVerifier {
    store: Arc<dyn CredentialStore>,
    cost: u32,
    dummy_hash: String,
}

impl PasswordVerifier {
    /// Create a verifier over `store` hashing with the given bcrypt cost.
    ///
    /// Computes one hash up front; fails if `cost` is outside bcrypt's range.
    pub fn new(store: Arc<dyn CredentialStore>, cost: u32) -> Result<Self, AuthError> {
        let dummy_hash = hash_password(TIMING_DUMMY_PASSWORD, cost)?;
        Ok(Self {
            store,
            cost,
            dummy_hash,
        })
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Register a new user.
    pub async fn register(&self, username: &str, password: &str) -> Result<UserRecord, AuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidInput(
                "username and password are required".into(),
            ));
        }
        // Cheap early exit; the insert below re-checks atomically.
        if self.store.get(username).await.is_some() {
            return Err(AuthError::AlreadyExists(username.to_string()));
        }

        let password = password.to_string();
        let cost = self.cost;
        let password_hash = run_blocking(move || hash_password(&password, cost)).await?;

        let record = UserRecord {
            username: username.to_string(),
            password_hash,
        };
        self.store.insert(record.clone()).await?;
        debug!(username, "user registered");
        Ok(record)
    }

    /// Verify a username/password pair.
    ///
    /// Unknown users and wrong passwords both return
    /// [`AuthError::InvalidCredentials`] after the same amount of hashing work.
    pub async fn verify(&self, username: &str, password: &str) -> Result<UserRecord, AuthError> {
        let record = self.store.get(username).await;
        let hash = record
            .as_ref()
            .map_or_else(|| self.dummy_hash.clone(), |r| r.password_hash.clone());

        let password = password.to_string();
        let matched = match run_blocking(move || verify_password(&password, &hash)).await {
            Ok(matched) => matched,
            Err(AuthError::Hash(e)) => {
                warn!(username, error = %e, "stored password hash is unreadable");
                false
            }
            Err(e) => return Err(e),
        };

        match record {
            Some(record) if matched => Ok(record),
            _ => Err(AuthError::InvalidCredentials),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
