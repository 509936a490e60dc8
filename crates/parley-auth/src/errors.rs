//! Auth error types.

/// Errors that can occur during registration and password verification.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The username is already registered.
    #[error("username already in use: {0}")]
    AlreadyExists(String),

    /// Unknown user or wrong password. Never says which.
    #[error("incorrect username or password")]
    InvalidCredentials,

    /// A required field was empty.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// bcrypt hashing or verification failed.
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    /// The blocking hash task panicked or was cancelled.
    #[error("hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Reasons a token could not be issued or accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// Signature is valid but `exp` is in the past.
    #[error("token expired")]
    Expired,

    /// Token could not be parsed, or is missing required claims.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// Signature does not match the server secret.
    #[error("invalid token signature")]
    InvalidSignature,

    /// The token could not be signed.
    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl TokenError {
    /// Short stable name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::Malformed(_) => "malformed",
            Self::InvalidSignature => "invalid_signature",
            Self::Signing(_) => "signing",
        }
    }
}

/// Outcome of checking a request's credential at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    /// No credential was presented.
    #[error("not authenticated")]
    Unauthenticated,

    /// A credential was presented but rejected.
    #[error(transparent)]
    Invalid(#[from] TokenError),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
