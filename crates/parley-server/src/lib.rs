//! # parley-server
//!
//! Axum HTTP + `WebSocket` chat gateway.
//!
//! - HTTP endpoints: registration, login/logout, the authenticated feed,
//!   health, and Prometheus metrics
//! - `WebSocket` gateway: token-gated admission before the upgrade, per-client
//!   echo, broadcast to every live session, heartbeat and eviction
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use error::{ApiError, ApiResult, StartupError};
pub use server::{AppState, ParleyServer};
pub use shutdown::ShutdownCoordinator;
pub use websocket::handler::AdmissionPolicy;
pub use websocket::registry::SessionRegistry;
