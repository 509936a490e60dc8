//! WebSocket upgrade handlers.
//!
//! Admission is decided on the plain HTTP request, before the upgrade. A
//! rejected client gets an ordinary `403`/`401` response and never reaches
//! the registry.

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use parley_auth::{AuthGate, TokenCodec};
use tracing::debug;
use uuid::Uuid;

use super::session::{SessionConfig, run_session};
use crate::error::ApiError;
use crate::http::extract::authenticate_headers;
use crate::server::AppState;

/// Length of a generated client label.
const GENERATED_LABEL_LEN: usize = 8;

/// Who may open a chat socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionPolicy {
    /// A valid token is required.
    Authenticated,
    /// Anyone may connect, but a presented token must still be valid.
    Open,
}

impl AdmissionPolicy {
    /// Policy for the `require_auth` setting.
    pub fn from_require_auth(require_auth: bool) -> Self {
        if require_auth {
            Self::Authenticated
        } else {
            Self::Open
        }
    }

    /// The gate that enforces this policy.
    pub fn gate(self, codec: Arc<TokenCodec>) -> AuthGate {
        match self {
            Self::Authenticated => AuthGate::required(codec),
            Self::Open => AuthGate::optional(codec),
        }
    }
}

/// A short label for anonymous clients on `/ws`.
pub fn generated_label() -> String {
    // The tail of a v7 UUID is its random part.
    let hex = Uuid::now_v7().simple().to_string();
    hex[hex.len() - GENERATED_LABEL_LEN..].to_string()
}

/// GET /ws/{client_id}
pub async fn ws_with_id(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if let Err(e) = admit_request(&state, &headers) {
        return e.into_response();
    }
    upgrade(&state, ws, client_id)
}

/// GET /ws
///
/// The label is the token subject, or a generated id for anonymous clients.
pub async fn ws_default(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let label = match admit_request(&state, &headers) {
        Ok(Some(subject)) => subject,
        Ok(None) => generated_label(),
        Err(e) => return e.into_response(),
    };
    upgrade(&state, ws, label)
}

fn admit_request(state: &AppState, headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let gate = state.admission.gate(state.codec.clone());
    authenticate_headers(headers, &state.config.cookie_name, &gate)
}

fn upgrade(
    state: &AppState,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    label: String,
) -> Response {
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            debug!(error = %rejection, "not a websocket upgrade");
            return rejection.into_response();
        }
    };
    if state.shutdown.is_shutting_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let registry = state.registry.clone();
    let config = SessionConfig::from(state.config.as_ref());
    let shutdown = state.shutdown.token();
    let guard = state.shutdown.session_guard();
    ws.max_message_size(state.config.max_message_size)
        .max_frame_size(state.config.max_message_size)
        .on_upgrade(move |socket| async move {
            let _ = run_session(socket, label, registry, config, shutdown).await;
            drop(guard);
        })
}
