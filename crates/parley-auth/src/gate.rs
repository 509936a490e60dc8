//! Credential extraction and checking at the request boundary.
//!
//! A request may carry a token in the `Authorization: Bearer` header or in
//! the session cookie. The header wins when both are present. A header that
//! is present but unusable is rejected outright and never falls through to
//! the cookie.

use std::sync::Arc;

use tracing::warn;

use crate::errors::{GateError, TokenError};
use crate::token::TokenCodec;

const BEARER: &str = "bearer";

/// Pick the presented token out of the raw header and cookie values.
///
/// Returns `Ok(None)` when neither source carries a credential.
pub fn presented_token(
    authorization: Option<&str>,
    cookie: Option<&str>,
) -> Result<Option<String>, TokenError> {
    if let Some(header) = authorization {
        return parse_bearer(header).map(Some);
    }
    Ok(cookie.and_then(cookie_token))
}

fn parse_bearer(header: &str) -> Result<String, TokenError> {
    let header = header.trim();
    let (scheme, value) = header.split_once(' ').unwrap_or((header, ""));
    if !scheme.eq_ignore_ascii_case(BEARER) {
        return Err(TokenError::Malformed("authorization scheme is not bearer".into()));
    }
    let value = value.trim();
    if value.is_empty() {
        return Err(TokenError::Malformed("empty bearer token".into()));
    }
    Ok(value.to_string())
}

fn cookie_token(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let value = match raw.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case(BEARER) => rest.trim(),
        _ => raw,
    };
    (!value.is_empty()).then(|| value.to_string())
}

/// Validates presented credentials.
///
/// With `auto_error` set, a missing credential is an error; otherwise it is
/// reported as `Ok(None)`. A credential that is present but bad is always an
/// error.
#[derive(Clone)]
pub struct AuthGate {
    codec: Arc<TokenCodec>,
    auto_error: bool,
}

impl AuthGate {
    /// Gate that rejects requests without a credential.
    pub fn required(codec: Arc<TokenCodec>) -> Self {
        Self {
            codec,
            auto_error: true,
        }
    }

    /// Gate that lets requests without a credential through.
    pub fn optional(codec: Arc<TokenCodec>) -> Self {
        Self {
            codec,
            auto_error: false,
        }
    }

    /// Whether a missing credential is an error.
    pub fn auto_error(&self) -> bool {
        self.auto_error
    }

    /// The codec used for validation.
    pub fn codec(&self) -> &Arc<TokenCodec> {
        &self.codec
    }

    /// Check the request's credential and return the authenticated subject.
    pub fn authenticate(
        &self,
        authorization: Option<&str>,
        cookie: Option<&str>,
    ) -> Result<Option<String>, GateError> {
        let token = match presented_token(authorization, cookie) {
            Ok(Some(token)) => token,
            Ok(None) if self.auto_error => return Err(GateError::Unauthenticated),
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!(kind = e.kind(), "rejected credential");
                return Err(e.into());
            }
        };

        match self.codec.validate(&token) {
            Ok(subject) => Ok(Some(subject)),
            Err(e) => {
                warn!(kind = e.kind(), "rejected credential");
                Err(e.into())
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
