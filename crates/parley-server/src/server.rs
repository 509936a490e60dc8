//! `ParleyServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use parley_auth::{InMemoryCredentialStore, PasswordVerifier, TokenCodec, UserRecord};
use parley_settings::ParleySettings;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::error::StartupError;
use crate::health::{self, HealthResponse, HealthcheckResponse};
use crate::http::{auth, feed};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::handler::{self, AdmissionPolicy};
use crate::websocket::registry::SessionRegistry;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live chat sessions.
    pub registry: Arc<SessionRegistry>,
    /// Account registration and login.
    pub verifier: Arc<PasswordVerifier>,
    /// Token issue and validation.
    pub codec: Arc<TokenCodec>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Who may open a chat socket.
    pub admission: AdmissionPolicy,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The Parley chat server.
pub struct ParleyServer {
    config: Arc<ServerConfig>,
    registry: Arc<SessionRegistry>,
    verifier: Arc<PasswordVerifier>,
    codec: Arc<TokenCodec>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl ParleyServer {
    /// Create a new server.
    pub fn new(config: ServerConfig, verifier: PasswordVerifier, codec: TokenCodec) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(SessionRegistry::new()),
            verifier: Arc::new(verifier),
            codec: Arc::new(codec),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build a server from loaded settings, seeding the credential store
    /// with the configured users.
    pub fn from_settings(settings: &ParleySettings) -> Result<Self, StartupError> {
        settings.validate()?;
        let secret = settings.require_secret()?;
        let codec = TokenCodec::new(
            secret,
            chrono::Duration::minutes(settings.auth.token_ttl_minutes),
        )?;

        let seeds = settings.auth.users.iter().map(|u| UserRecord {
            username: u.username.clone(),
            password_hash: u.password_hash.clone(),
        });
        let store = Arc::new(InMemoryCredentialStore::with_users(seeds));
        let verifier = PasswordVerifier::new(store, settings.auth.bcrypt_cost)?;
        info!(
            seeded_users = settings.auth.users.len(),
            require_auth = settings.server.require_auth,
            "server configured"
        );

        let config = ServerConfig::from_settings(&settings.server, &settings.auth);
        Ok(Self::new(config, verifier, codec))
    }

    /// Handler state for this server.
    pub fn state(&self) -> AppState {
        AppState {
            registry: self.registry.clone(),
            verifier: self.verifier.clone(),
            codec: self.codec.clone(),
            config: self.config.clone(),
            admission: AdmissionPolicy::from_require_auth(self.config.require_auth),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/register", post(auth::register))
            .route("/login", post(auth::login))
            .route("/logout", get(auth::logout))
            .route("/feed", get(feed::feed))
            .route("/ws", get(handler::ws_default))
            .route("/ws/{client_id}", get(handler::ws_with_id))
            .route("/health", get(health_handler))
            .route("/healthcheck", get(healthcheck_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the server task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "parley server listening");

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server stopped with error");
            }
            info!("server stopped");
        });
        Ok((local_addr, handle))
    }

    /// Get the session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Get the password verifier.
    pub fn verifier(&self) -> &Arc<PasswordVerifier> {
        &self.verifier
    }

    /// Get the token codec.
    pub fn codec(&self) -> &Arc<TokenCodec> {
        &self.codec
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.registry.len().await;
    Json(health::health_check(state.start_time, connections))
}

/// GET /healthcheck
async fn healthcheck_handler() -> Json<HealthcheckResponse> {
    Json(health::healthcheck())
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, header};
    use parley_auth::hash_password;
    use parley_settings::SeedUser;
    use secrecy::SecretString;
    use tower::ServiceExt;

    const SECRET: &str = "server-test-secret";

    fn make_server_with(config: ServerConfig) -> ParleyServer {
        let store = Arc::new(InMemoryCredentialStore::new());
        let verifier = PasswordVerifier::new(store, 4).unwrap();
        let codec =
            TokenCodec::new(&SecretString::from(SECRET), chrono::Duration::minutes(30)).unwrap();
        ParleyServer::new(config, verifier, codec)
    }

    fn make_server() -> ParleyServer {
        make_server_with(ServerConfig::default())
    }

    fn form(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn get_with(uri: &str, name: header::HeaderName, value: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(name, value)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(resp: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn set_cookie(resp: &Response) -> String {
        resp.headers()[header::SET_COOKIE].to_str().unwrap().to_string()
    }

    async fn register(app: &Router, username: &str, password: &str) -> Response {
        app.clone()
            .oneshot(form("/register", &format!("username={username}&password={password}")))
            .await
            .unwrap()
    }

    #[test]
    fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert!(!server.shutdown().is_shutting_down());
        assert_eq!(server.state().admission, AdmissionPolicy::Authenticated);
    }

    #[test]
    fn open_admission_follows_config() {
        let server = make_server_with(ServerConfig {
            require_auth: false,
            ..ServerConfig::default()
        });
        assert_eq!(server.state().admission, AdmissionPolicy::Open);
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = make_server().router();
        let resp = app.oneshot(get_req("/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let parsed = json_body(resp).await;
        assert_eq!(parsed["status"], "ok");
        assert!(parsed["uptime_secs"].is_number());
        assert_eq!(parsed["connections"], 0);
    }

    #[tokio::test]
    async fn healthcheck_endpoint() {
        let app = make_server().router();
        let resp = app.oneshot(get_req("/healthcheck")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await, serde_json::json!({"msg": "OK"}));
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_404() {
        let app = make_server().router();
        let resp = app.oneshot(get_req("/metrics")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = make_server().router();
        let resp = app.oneshot(get_req("/nonexistent")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn register_then_duplicate() {
        let app = make_server().router();

        let resp = register(&app, "alice", "secret123").await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(json_body(resp).await["detail"], "User created successfully!");

        let resp = register(&app, "alice", "other").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["detail"], "Username already in use!");
    }

    #[tokio::test]
    async fn register_missing_field_is_400() {
        let app = make_server().router();
        let resp = app.oneshot(form("/register", "username=alice")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn login_redirects_with_cookie() {
        let app = make_server().router();
        let _ = register(&app, "alice", "secret123").await;

        let resp = app
            .clone()
            .oneshot(form("/login", "username=alice&password=secret123"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers()[header::LOCATION], "/feed");

        let cookie = set_cookie(&resp);
        assert!(cookie.starts_with("token="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Path=/"));
        assert!(!cookie.contains("Secure"));
    }

    #[tokio::test]
    async fn login_accepts_oauth2_fields() {
        let app = make_server().router();
        let _ = register(&app, "alice", "secret123").await;
        let resp = app
            .oneshot(form(
                "/login",
                "grant_type=password&username=alice&password=secret123&scope=",
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FOUND);
    }

    #[tokio::test]
    async fn login_json_returns_token() {
        let server = make_server();
        let app = server.router();
        let _ = register(&app, "alice", "secret123").await;

        let mut req = form("/login", "username=alice&password=secret123");
        let _ = req
            .headers_mut()
            .insert(header::ACCEPT, "application/json".parse().unwrap());
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(set_cookie(&resp).starts_with("token="));

        let body = json_body(resp).await;
        assert_eq!(body["token_type"], "bearer");
        assert_eq!(body["expires_in"], 1800);
        let token = body["access_token"].as_str().unwrap();
        assert_eq!(server.codec().validate(token).unwrap(), "alice");
    }

    #[tokio::test]
    async fn login_failures_are_identical() {
        let app = make_server().router();
        let _ = register(&app, "alice", "secret123").await;

        let wrong = app
            .clone()
            .oneshot(form("/login", "username=alice&password=nope"))
            .await
            .unwrap();
        let unknown = app
            .oneshot(form("/login", "username=bob&password=secret123"))
            .await
            .unwrap();

        assert_eq!(wrong.status(), StatusCode::BAD_REQUEST);
        assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
        assert!(wrong.headers().get(header::SET_COOKIE).is_none());
        assert_eq!(json_body(wrong).await, json_body(unknown).await);
    }

    #[tokio::test]
    async fn login_missing_fields_fail_like_bad_credentials() {
        let app = make_server().router();
        let _ = register(&app, "alice", "secret123").await;

        let wrong = app
            .clone()
            .oneshot(form("/login", "username=alice&password=nope"))
            .await
            .unwrap();
        let wrong = json_body(wrong).await;
        for body in ["username=alice", "password=secret123", ""] {
            let resp = app.clone().oneshot(form("/login", body)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{body:?}");
            assert!(resp.headers().get(header::SET_COOKIE).is_none());
            assert_eq!(json_body(resp).await, wrong, "{body:?}");
        }
    }

    #[tokio::test]
    async fn logout_clears_cookie() {
        let app = make_server().router();
        let resp = app
            .oneshot(get_with("/logout", header::COOKIE, "token=abc"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers()[header::LOCATION], "/");
        let cookie = set_cookie(&resp);
        assert!(cookie.starts_with("token="));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn logout_without_cookie_still_redirects() {
        let app = make_server().router();
        let resp = app.oneshot(get_req("/logout")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers()[header::LOCATION], "/");
    }

    #[tokio::test]
    async fn feed_requires_token() {
        let app = make_server().router();
        let resp = app.oneshot(get_req("/feed")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(resp).await["detail"], "Not authenticated");
    }

    #[tokio::test]
    async fn feed_rejects_bad_token() {
        let app = make_server().router();
        let resp = app
            .oneshot(get_with("/feed", header::AUTHORIZATION, "Bearer garbage"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(resp.headers()[header::WWW_AUTHENTICATE], "Bearer");
        assert_eq!(json_body(resp).await["detail"], "Invalid credentials!");
    }

    #[tokio::test]
    async fn feed_with_header_token() {
        let server = make_server();
        let token = server.codec().issue("alice").unwrap().token;
        let resp = server
            .router()
            .oneshot(get_with("/feed", header::AUTHORIZATION, &format!("Bearer {token}")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["username"], "alice");
        assert_eq!(body["channel"], "/ws/alice");
    }

    #[tokio::test]
    async fn feed_with_cookie_token() {
        let server = make_server();
        let token = server.codec().issue("alice").unwrap().token;
        let resp = server
            .router()
            .oneshot(get_with("/feed", header::COOKIE, &format!("token={token}")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn feed_with_expired_token() {
        let server = make_server();
        let token = server
            .codec()
            .issue_with_ttl("alice", chrono::Duration::seconds(-5))
            .unwrap()
            .token;
        let resp = server
            .router()
            .oneshot(get_with("/feed", header::AUTHORIZATION, &format!("Bearer {token}")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn ws_without_token_is_403_before_upgrade() {
        let server = make_server();
        for uri in ["/ws", "/ws/alice"] {
            let resp = server.router().oneshot(get_req(uri)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{uri}");
        }
        assert!(server.registry().is_empty().await);
    }

    #[tokio::test]
    async fn ws_with_bad_token_is_401_before_upgrade() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(get_with("/ws/alice", header::COOKIE, "token=garbage"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(server.registry().is_empty().await);
    }

    #[tokio::test]
    async fn ws_with_valid_token_needs_upgrade_request() {
        let server = make_server();
        let token = server.codec().issue("alice").unwrap().token;
        let resp = server
            .router()
            .oneshot(get_with("/ws/alice", header::AUTHORIZATION, &format!("Bearer {token}")))
            .await
            .unwrap();
        let status = resp.status();
        assert!(status.is_client_error());
        assert_ne!(status, StatusCode::FORBIDDEN);
        assert_ne!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn open_ws_still_rejects_bad_token() {
        let server = make_server_with(ServerConfig {
            require_auth: false,
            ..ServerConfig::default()
        });
        let resp = server
            .router()
            .oneshot(get_with("/ws", header::AUTHORIZATION, "Bearer garbage"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = server.router().oneshot(get_req("/ws")).await.unwrap();
        assert_ne!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn from_settings_seeds_users() {
        let mut settings = ParleySettings::default();
        settings.auth.secret_key = Some(SecretString::from(SECRET));
        settings.auth.bcrypt_cost = 4;
        settings.auth.users = vec![SeedUser {
            username: "alice".into(),
            password_hash: hash_password("secret123", 4).unwrap(),
        }];

        let server = ParleyServer::from_settings(&settings).unwrap();
        let user = server.verifier().verify("alice", "secret123").await.unwrap();
        assert_eq!(user.username, "alice");
    }

    #[test]
    fn from_settings_requires_secret() {
        let settings = ParleySettings::default();
        assert!(matches!(
            ParleyServer::from_settings(&settings),
            Err(StartupError::Settings(parley_settings::SettingsError::MissingSecret))
        ));
    }

    #[test]
    fn shutdown_propagates_to_coordinator() {
        let server = make_server();
        let shutdown = server.shutdown().clone();
        shutdown.shutdown();
        assert!(server.shutdown().is_shutting_down());
    }
}
