//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Fails if a global recorder
/// is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Inbound chat messages total (counter).
pub const WS_MESSAGES_TOTAL: &str = "ws_messages_total";
/// Messages that could not be queued for a recipient (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Sessions evicted for a full or closed queue (counter).
pub const WS_EVICTIONS_TOTAL: &str = "ws_evictions_total";
/// Login attempts (counter, labels: outcome).
pub const AUTH_LOGINS_TOTAL: &str = "auth_logins_total";
/// Successful registrations (counter).
pub const AUTH_REGISTRATIONS_TOTAL: &str = "auth_registrations_total";
/// Rejected credentials at the boundary (counter, labels: kind).
pub const AUTH_REJECTIONS_TOTAL: &str = "auth_rejections_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_global_install() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(WS_CONNECTIONS_TOTAL).increment(3);
        });
        let output = render(&handle);
        assert!(output.contains("ws_connections_total 3"));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_CONNECTION_DURATION_SECONDS,
            WS_MESSAGES_TOTAL,
            WS_BROADCAST_DROPS_TOTAL,
            WS_EVICTIONS_TOTAL,
            AUTH_LOGINS_TOTAL,
            AUTH_REGISTRATIONS_TOTAL,
            AUTH_REJECTIONS_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "{name} is not snake_case"
            );
        }
    }
}
