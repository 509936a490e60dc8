//! Liveness endpoints.

use serde::Serialize;
use std::time::Instant;

/// `/health` response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Current WebSocket connection count.
    pub connections: usize,
}

/// `/healthcheck` response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthcheckResponse {
    /// Always `"OK"`.
    pub msg: &'static str,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
    }
}

/// The minimal liveness probe body.
pub fn healthcheck() -> HealthcheckResponse {
    HealthcheckResponse { msg: "OK" }
}
