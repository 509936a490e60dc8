//! WebSocket client connection state.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Opaque, time-ordered connection identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh id. Ids from one process sort in creation order.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A connected chat client.
pub struct ClientConnection {
    /// Registry key.
    pub id: ConnectionId,
    /// Name shown in broadcast text.
    pub label: String,
    /// Outbound queue drained by the writer task.
    tx: mpsc::Sender<Arc<str>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Last inbound frame of any kind.
    last_activity: Mutex<Instant>,
    /// Messages that could not be queued.
    dropped_messages: AtomicU64,
    /// Cancelled when the session must end.
    closed: CancellationToken,
}

impl ClientConnection {
    /// Create a connection around an outbound queue and a close signal.
    pub fn new(
        id: ConnectionId,
        label: impl Into<String>,
        tx: mpsc::Sender<Arc<str>>,
        closed: CancellationToken,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            label: label.into(),
            tx,
            connected_at: now,
            last_activity: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            closed,
        }
    }

    /// Queue a text message for the client.
    ///
    /// Returns `false` if the queue is full or closed, and increments the
    /// dropped message counter. Never waits.
    pub fn send(&self, message: Arc<str>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record inbound activity (a message, ping, or pong).
    pub fn mark_alive(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Time since the last inbound activity (or since connecting).
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Signal the session to close.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether [`close`](Self::close) has been called or the server is stopping.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// The token cancelled when this connection closes.
    pub fn close_token(&self) -> &CancellationToken {
        &self.closed
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection(capacity: usize) -> (ClientConnection, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = ClientConnection::new(ConnectionId::new(), "alice", tx, CancellationToken::new());
        (conn, rx)
    }

    #[test]
    fn ids_sort_in_creation_order() {
        let ids: Vec<ConnectionId> = (0..100).map(|_| ConnectionId::new()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
        assert_ne!(a.to_string(), b.to_string());
    }

    #[tokio::test]
    async fn send_message_success() {
        let (conn, mut rx) = make_connection(8);
        assert!(conn.send(Arc::from("hello")));
        assert_eq!(&*rx.recv().await.unwrap(), "hello");
        assert_eq!(conn.drop_count(), 0);
    }

    #[tokio::test]
    async fn send_to_closed_channel_returns_false() {
        let (conn, rx) = make_connection(8);
        drop(rx);
        assert!(!conn.send(Arc::from("hello")));
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn send_to_full_channel_returns_false() {
        let (conn, _rx) = make_connection(1);
        assert!(conn.send(Arc::from("msg1")));
        assert!(!conn.send(Arc::from("msg2")));
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn messages_arrive_in_order() {
        let (conn, mut rx) = make_connection(8);
        for i in 0..5 {
            assert!(conn.send(Arc::from(format!("msg_{i}"))));
        }
        for i in 0..5 {
            assert_eq!(&*rx.recv().await.unwrap(), format!("msg_{i}"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn mark_alive_resets_idle_time() {
        let (conn, _rx) = make_connection(8);
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(conn.idle_for() >= Duration::from_secs(10));
        conn.mark_alive();
        assert!(conn.idle_for() < Duration::from_secs(1));
        assert!(conn.age() >= Duration::from_secs(10));
    }

    #[test]
    fn close_cancels_token() {
        let (conn, _rx) = make_connection(8);
        assert!(!conn.is_closed());
        conn.close();
        assert!(conn.is_closed());
        assert!(conn.close_token().is_cancelled());
    }

    #[test]
    fn parent_cancellation_closes_connection() {
        let parent = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(1);
        let conn = ClientConnection::new(ConnectionId::new(), "bob", tx, parent.child_token());
        parent.cancel();
        assert!(conn.is_closed());
    }
}
