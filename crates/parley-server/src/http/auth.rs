//! Registration, login, and logout.

use axum::Json;
use axum::extract::{Form, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use metrics::counter;
use parley_auth::AuthError;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::metrics::{AUTH_LOGINS_TOTAL, AUTH_REGISTRATIONS_TOTAL};
use crate::server::AppState;

/// `POST /register` form.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    /// Requested login name.
    #[serde(default)]
    pub username: String,
    /// Plaintext password.
    #[serde(default)]
    pub password: String,
}

/// `POST /login` form, OAuth2 password-grant shaped.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    /// Login name.
    #[serde(default)]
    pub username: String,
    /// Plaintext password.
    #[serde(default)]
    pub password: String,
    /// Accepted and ignored.
    #[serde(default)]
    pub grant_type: Option<String>,
    /// Accepted and ignored.
    #[serde(default)]
    pub scope: Option<String>,
}

/// JSON login response for non-browser clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The signed token.
    pub access_token: String,
    /// Always `"bearer"`.
    pub token_type: String,
    /// Seconds until the token expires.
    pub expires_in: i64,
}

/// `{"detail": ...}` body for successful operations.
#[derive(Debug, Serialize)]
pub struct Detail {
    /// Human-readable outcome.
    pub detail: &'static str,
}

/// POST /register
pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> ApiResult<(StatusCode, Json<Detail>)> {
    let _ = state.verifier.register(&form.username, &form.password).await?;
    info!(username = %form.username, "user registered");
    counter!(AUTH_REGISTRATIONS_TOTAL).increment(1);
    Ok((
        StatusCode::CREATED,
        Json(Detail {
            detail: "User created successfully!",
        }),
    ))
}

/// POST /login
///
/// Browsers get a `302` to `/feed`; clients asking for JSON get the token in
/// the body. Both get the session cookie.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> ApiResult<Response> {
    let user = match state.verifier.verify(&form.username, &form.password).await {
        Ok(user) => user,
        Err(AuthError::InvalidCredentials) => {
            warn!("login rejected");
            counter!(AUTH_LOGINS_TOTAL, "outcome" => "rejected").increment(1);
            return Err(ApiError::InvalidCredentials);
        }
        Err(e) => return Err(e.into()),
    };

    let issued = state.codec.issue(&user.username)?;
    info!(username = %user.username, "login succeeded");
    counter!(AUTH_LOGINS_TOTAL, "outcome" => "ok").increment(1);

    let cookie = Cookie::build((state.config.cookie_name.clone(), issued.token.clone()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.secure_cookie)
        .path("/");
    let jar = jar.add(cookie);

    if wants_json(&headers) {
        let body = TokenResponse {
            access_token: issued.token,
            token_type: "bearer".into(),
            expires_in: state.codec.default_ttl().num_seconds(),
        };
        return Ok((jar, Json(body)).into_response());
    }
    Ok((StatusCode::FOUND, jar, [(header::LOCATION, "/feed")]).into_response())
}

/// GET /logout
///
/// Clears the cookie only. The token itself stays valid until it expires.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    let jar = jar.remove(Cookie::build((state.config.cookie_name.clone(), "")).path("/"));
    (StatusCode::FOUND, jar, [(header::LOCATION, "/")]).into_response()
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|part| {
            part.split(';')
                .next()
                .is_some_and(|media| media.trim().eq_ignore_ascii_case("application/json"))
        })
}
