//! Live session registry and message fan-out.
//!
//! Sessions are keyed by [`ConnectionId`], which sorts in admission order,
//! so a broadcast reaches recipients in the order they joined. A broadcast
//! holds the read lock for the whole pass: a concurrent admit or remove
//! lands entirely before or entirely after it.

use std::collections::BTreeMap;
use std::sync::Arc;

use metrics::{counter, gauge};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::connection::{ClientConnection, ConnectionId};
use crate::metrics::{WS_BROADCAST_DROPS_TOTAL, WS_CONNECTIONS_ACTIVE, WS_EVICTIONS_TOTAL};

#[allow(clippy::cast_precision_loss)]
fn record_active(count: usize) {
    gauge!(WS_CONNECTIONS_ACTIVE).set(count as f64);
}

/// The set of currently connected sessions.
pub struct SessionRegistry {
    sessions: RwLock<BTreeMap<ConnectionId, Arc<ClientConnection>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Add a live connection and return its id.
    pub async fn admit(&self, connection: Arc<ClientConnection>) -> ConnectionId {
        let id = connection.id;
        let mut sessions = self.sessions.write().await;
        let _ = sessions.insert(id, connection);
        record_active(sessions.len());
        debug!(connection_id = %id, sessions = sessions.len(), "session admitted");
        id
    }

    /// Remove a connection. Returns whether it was present.
    pub async fn remove(&self, id: &ConnectionId) -> bool {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(id).is_some();
        if removed {
            record_active(sessions.len());
            debug!(connection_id = %id, sessions = sessions.len(), "session removed");
        }
        removed
    }

    /// Queue `message` for every session. Returns how many accepted it.
    ///
    /// Sessions whose queue is full or closed are evicted once the pass is
    /// done.
    pub async fn broadcast(&self, message: Arc<str>) -> usize {
        let mut failed = Vec::new();
        let delivered = {
            let sessions = self.sessions.read().await;
            let mut delivered = 0;
            for conn in sessions.values() {
                if conn.send(message.clone()) {
                    delivered += 1;
                } else {
                    failed.push(conn.clone());
                }
            }
            debug!(recipients = sessions.len(), delivered, "broadcast");
            delivered
        };

        if !failed.is_empty() {
            counter!(WS_BROADCAST_DROPS_TOTAL).increment(failed.len() as u64);
            self.evict(failed).await;
        }
        delivered
    }

    /// Queue `message` for one session. Returns whether it was accepted.
    ///
    /// A session that cannot accept it is evicted.
    pub async fn unicast(&self, id: &ConnectionId, message: Arc<str>) -> bool {
        let target = self.sessions.read().await.get(id).cloned();
        let Some(conn) = target else {
            return false;
        };
        if conn.send(message) {
            return true;
        }
        counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
        self.evict(vec![conn]).await;
        false
    }

    async fn evict(&self, connections: Vec<Arc<ClientConnection>>) {
        {
            let mut sessions = self.sessions.write().await;
            for conn in &connections {
                let _ = sessions.remove(&conn.id);
            }
            record_active(sessions.len());
        }
        for conn in connections {
            warn!(
                connection_id = %conn.id,
                label = %conn.label,
                dropped = conn.drop_count(),
                "evicting slow or closed session"
            );
            counter!(WS_EVICTIONS_TOTAL).increment(1);
            conn.close();
        }
    }

    /// Look up a session.
    pub async fn get(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Whether `id` is currently admitted.
    pub async fn contains(&self, id: &ConnectionId) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no sessions are live.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Labels of live sessions in admission order.
    pub async fn labels(&self) -> Vec<String> {
        self.sessions
            .read()
            .await
            .values()
            .map(|c| c.label.clone())
            .collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
