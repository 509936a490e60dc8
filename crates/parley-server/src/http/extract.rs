//! Request credential extraction.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, header};
use axum_extra::extract::cookie::CookieJar;
use metrics::counter;
use parley_auth::{AuthGate, GateError, TokenError};

use crate::error::ApiError;
use crate::metrics::AUTH_REJECTIONS_TOTAL;
use crate::server::AppState;

/// Raw credential sources found on a request.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PresentedCredentials {
    /// `Authorization` header value.
    pub authorization: Option<String>,
    /// Session cookie value.
    pub cookie: Option<String>,
}

impl PresentedCredentials {
    /// Read the `Authorization` header and the named cookie.
    ///
    /// A header that is not valid ASCII is a malformed credential.
    pub fn from_headers(headers: &HeaderMap, cookie_name: &str) -> Result<Self, TokenError> {
        let authorization = headers
            .get(header::AUTHORIZATION)
            .map(|v| {
                v.to_str()
                    .map(str::to_string)
                    .map_err(|_| TokenError::Malformed("authorization header is not ASCII".into()))
            })
            .transpose()?;
        let cookie = CookieJar::from_headers(headers)
            .get(cookie_name)
            .map(|c| c.value().to_string());
        Ok(Self {
            authorization,
            cookie,
        })
    }

    /// Run the gate over these credentials.
    pub fn authenticate(&self, gate: &AuthGate) -> Result<Option<String>, GateError> {
        gate.authenticate(self.authorization.as_deref(), self.cookie.as_deref())
    }
}

/// Check a request's credentials against `gate`, counting rejections.
pub fn authenticate_headers(
    headers: &HeaderMap,
    cookie_name: &str,
    gate: &AuthGate,
) -> Result<Option<String>, ApiError> {
    let result = PresentedCredentials::from_headers(headers, cookie_name)
        .map_err(GateError::from)
        .and_then(|creds| creds.authenticate(gate));
    result.map_err(|e| {
        let kind = match &e {
            GateError::Unauthenticated => "unauthenticated",
            GateError::Invalid(t) => t.kind(),
        };
        counter!(AUTH_REJECTIONS_TOTAL, "kind" => kind).increment(1);
        ApiError::from(e)
    })
}

/// The subject of a valid token. Rejects with 403 when no token is
/// presented and 401 when the token is bad.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let gate = AuthGate::required(state.codec.clone());
        match authenticate_headers(&parts.headers, &state.config.cookie_name, &gate)? {
            Some(subject) => Ok(Self(subject)),
            None => Err(ApiError::NotAuthenticated),
        }
    }
}
