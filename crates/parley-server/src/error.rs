//! HTTP error mapping.
//!
//! Every failure leaves the server as a JSON `{"detail": ...}` body. Internal
//! details are logged, never returned.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use parley_auth::{AuthError, GateError, TokenError};
use serde_json::json;
use tracing::error;

/// Errors surfaced by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Registration with a taken username.
    #[error("Username already in use!")]
    UsernameTaken,

    /// Login failed. Unknown user and wrong password look the same.
    #[error("Incorrect username or password")]
    InvalidCredentials,

    /// A required field was missing or empty.
    #[error("{0}")]
    InvalidInput(String),

    /// No credential was presented.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// A credential was presented but rejected.
    #[error("Invalid credentials!")]
    InvalidToken(TokenError),

    /// Anything the client cannot fix.
    #[error("Internal server error")]
    Internal(String),
}

/// Result type for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Failures building a server from settings.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// Settings were missing or inconsistent.
    #[error(transparent)]
    Settings(#[from] parley_settings::SettingsError),

    /// The password verifier could not be built.
    #[error("auth setup failed: {0}")]
    Auth(#[from] AuthError),

    /// The token codec rejected the secret.
    #[error("token setup failed: {0}")]
    Token(#[from] TokenError),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UsernameTaken | Self::InvalidCredentials | Self::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotAuthenticated => StatusCode::FORBIDDEN,
            Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            error!(detail = %detail, "internal error");
        }
        let status = self.status();
        let body = Json(json!({ "detail": self.to_string() }));
        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            let _ = response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::AlreadyExists(_) => Self::UsernameTaken,
            AuthError::InvalidCredentials => Self::InvalidCredentials,
            AuthError::InvalidInput(msg) => Self::InvalidInput(msg),
            AuthError::Hash(_) | AuthError::Task(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(msg) => Self::Internal(msg),
            other => Self::InvalidToken(other),
        }
    }
}

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Unauthenticated => Self::NotAuthenticated,
            GateError::Invalid(e) => e.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
