//! WebSocket session lifecycle: handles a single connected client from
//! upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use futures::{SinkExt, StreamExt};
use metrics::{counter, histogram};
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, instrument, warn};

use super::connection::{ClientConnection, ConnectionId};
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use super::registry::SessionRegistry;
use crate::config::ServerConfig;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
    WS_MESSAGES_TOTAL,
};

/// Per-session tuning, taken from [`ServerConfig`].
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Broadcast a join notice after admission.
    pub announce_joins: bool,
    /// Outbound queue capacity.
    pub send_queue_capacity: usize,
    /// Per-frame write timeout.
    pub send_timeout: Duration,
    /// Ping cadence.
    pub heartbeat_interval: Duration,
    /// Idle time before the client is dropped.
    pub heartbeat_timeout: Duration,
}

impl From<&ServerConfig> for SessionConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            announce_joins: config.announce_joins,
            send_queue_capacity: config.send_queue_capacity.max(1),
            send_timeout: Duration::from_millis(config.send_timeout_ms),
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval_secs.max(1)),
            heartbeat_timeout: Duration::from_secs(config.heartbeat_timeout_secs),
        }
    }
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent a close frame.
    ClientClosed,
    /// The stream ended without a close frame.
    StreamEnded,
    /// Reading from the socket failed.
    TransportError,
    /// Closed from the server side: eviction, heartbeat, or a failed write.
    Dropped,
    /// The server is shutting down.
    Shutdown,
}

impl CloseReason {
    /// Short stable name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::StreamEnded => "stream_ended",
            Self::TransportError => "transport_error",
            Self::Dropped => "dropped",
            Self::Shutdown => "shutdown",
        }
    }
}

/// `You wrote: <msg>`, sent back to the author only.
pub fn echo_text(message: &str) -> Arc<str> {
    Arc::from(format!("You wrote: {message}"))
}

/// `Client #<label> says: <msg>`, sent to everyone.
pub fn says_text(label: &str, message: &str) -> Arc<str> {
    Arc::from(format!("Client #{label} says: {message}"))
}

/// `Client #<label> joined the chat`.
pub fn joined_text(label: &str) -> Arc<str> {
    Arc::from(format!("Client #{label} joined the chat"))
}

/// `Client #<label> left the chat`.
pub fn left_text(label: &str) -> Arc<str> {
    Arc::from(format!("Client #{label} left the chat"))
}

/// Run a chat session for an upgraded socket.
///
/// 1. Admits the connection to the registry (and announces it if configured)
/// 2. Echoes each inbound text frame to the author and broadcasts it to all
/// 3. Forwards queued outbound text and sends periodic Ping frames
/// 4. Drops clients that go quiet past the heartbeat timeout
/// 5. On any exit, removes the session and broadcasts a leave notice
#[instrument(skip_all, fields(label = %label, connection_id))]
pub async fn run_session(
    socket: WebSocket,
    label: String,
    registry: Arc<SessionRegistry>,
    config: SessionConfig,
    shutdown: CancellationToken,
) -> CloseReason {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<str>>(config.send_queue_capacity);
    let cancel = shutdown.child_token();
    let id = ConnectionId::new();
    let _ = Span::current().record("connection_id", tracing::field::display(id));
    let connection = Arc::new(ClientConnection::new(
        id,
        label.clone(),
        send_tx,
        cancel.clone(),
    ));

    let _ = registry.admit(connection.clone()).await;
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);

    if config.announce_joins {
        let _ = registry.broadcast(joined_text(&label)).await;
    }

    // Outbound forwarder with periodic Ping frames.
    let writer = {
        let cancel = cancel.clone();
        let send_timeout = config.send_timeout;
        let ping_every = config.heartbeat_interval;
        tokio::spawn(
            async move {
                let mut ping_interval = time::interval(ping_every);
                // Skip the immediate first tick
                let _ = ping_interval.tick().await;

                loop {
                    let frame = tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        msg = send_rx.recv() => match msg {
                            Some(text) => Message::Text(text.to_string().into()),
                            None => break,
                        },
                        _ = ping_interval.tick() => Message::Ping(Bytes::new()),
                    };
                    match time::timeout(send_timeout, ws_tx.send(frame)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            debug!(error = %e, "socket write failed");
                            break;
                        }
                        Err(_) => {
                            warn!(timeout_ms = send_timeout.as_millis(), "socket write timed out");
                            break;
                        }
                    }
                }

                cancel.cancel();
                let close = Message::Close(Some(CloseFrame {
                    code: close_code::AWAY,
                    reason: Utf8Bytes::from_static("session closed"),
                }));
                let _ = time::timeout(send_timeout, ws_tx.send(close)).await;
            }
            .in_current_span(),
        )
    };

    let heartbeat = {
        let connection = connection.clone();
        let cancel = cancel.clone();
        let interval = config.heartbeat_interval;
        let timeout = config.heartbeat_timeout;
        tokio::spawn(
            async move {
                let result = run_heartbeat(connection.clone(), interval, timeout, cancel).await;
                if result == HeartbeatResult::TimedOut {
                    warn!(
                        idle_secs = connection.idle_for().as_secs(),
                        "client unresponsive, disconnecting"
                    );
                    connection.close();
                }
            }
            .in_current_span(),
        )
    };

    let reason = loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => {
                break if shutdown.is_cancelled() {
                    CloseReason::Shutdown
                } else {
                    CloseReason::Dropped
                };
            }
            frame = ws_rx.next() => frame,
        };

        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "socket read failed");
                break CloseReason::TransportError;
            }
            None => break CloseReason::StreamEnded,
        };
        connection.mark_alive();

        let text = match msg {
            Message::Text(t) => t.to_string(),
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(s) => s.to_string(),
                Err(_) => {
                    debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                    continue;
                }
            },
            Message::Close(_) => break CloseReason::ClientClosed,
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        counter!(WS_MESSAGES_TOTAL).increment(1);
        if !registry.unicast(&id, echo_text(&text)).await {
            break CloseReason::Dropped;
        }
        let _ = registry.broadcast(says_text(&label, &text)).await;
    };

    // Closing
    connection.close();
    let _ = registry.remove(&id).await;
    let _ = registry.broadcast(left_text(&label)).await;
    let _ = writer.await;
    let _ = heartbeat.await;

    info!(
        reason = reason.as_str(),
        dropped = connection.drop_count(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
    reason
}

#[cfg(test)]
mod tests {
    // Full sessions need a real socket; see tests/integration.rs.
    use super::*;

    #[test]
    fn message_texts() {
        assert_eq!(&*echo_text("hello"), "You wrote: hello");
        assert_eq!(&*says_text("alice", "hello"), "Client #alice says: hello");
        assert_eq!(&*joined_text("alice"), "Client #alice joined the chat");
        assert_eq!(&*left_text("alice"), "Client #alice left the chat");
    }

    #[test]
    fn texts_keep_payload_verbatim() {
        assert_eq!(&*echo_text(""), "You wrote: ");
        assert_eq!(
            &*says_text("7", "héllo {braces} #hash"),
            "Client #7 says: héllo {braces} #hash"
        );
    }

    #[test]
    fn session_config_from_server_config() {
        let server = ServerConfig {
            announce_joins: true,
            send_queue_capacity: 16,
            send_timeout_ms: 250,
            heartbeat_interval_secs: 5,
            heartbeat_timeout_secs: 15,
            ..ServerConfig::default()
        };
        let cfg = SessionConfig::from(&server);
        assert!(cfg.announce_joins);
        assert_eq!(cfg.send_queue_capacity, 16);
        assert_eq!(cfg.send_timeout, Duration::from_millis(250));
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(cfg.heartbeat_timeout, Duration::from_secs(15));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let server = ServerConfig {
            send_queue_capacity: 0,
            ..ServerConfig::default()
        };
        assert_eq!(SessionConfig::from(&server).send_queue_capacity, 1);
    }

    #[test]
    fn close_reason_names() {
        assert_eq!(CloseReason::ClientClosed.as_str(), "client_closed");
        assert_eq!(CloseReason::Shutdown.as_str(), "shutdown");
        assert_eq!(CloseReason::Dropped.as_str(), "dropped");
    }
}
