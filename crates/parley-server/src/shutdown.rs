//! Server shutdown: stop accepting, close every chat session, and wait for
//! each session to finish its leave notice and close frame.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tracing::{info, warn};

/// How long [`ShutdownCoordinator::graceful_shutdown`] waits by default.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns the server-wide stop signal and the set of running chat sessions.
///
/// Sessions derive their own token from [`token`](Self::token) and run
/// while holding a [`session_guard`](Self::session_guard), so a shutdown both tells
/// them to close and can wait until they have.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    sessions: TaskTracker,
}

impl ShutdownCoordinator {
    /// A coordinator with no sessions and the signal not yet raised.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            sessions: TaskTracker::new(),
        }
    }

    /// The server-wide stop signal.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Raise the stop signal. Safe to call more than once.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether the stop signal has been raised.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Register a session. Shutdown waits until the returned guard drops.
    ///
    /// Taken when the upgrade is accepted, so a session still completing its
    /// handshake is already counted.
    pub fn session_guard(&self) -> TaskTrackerToken {
        self.sessions.token()
    }

    /// Sessions still running.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Raise the stop signal, then wait for `server_tasks` and every tracked
    /// session, all within one `timeout`.
    ///
    /// Returns `false` if anything was still running when the time ran out.
    pub async fn graceful_shutdown(
        &self,
        server_tasks: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        self.shutdown();
        self.sessions.close();
        info!(
            server_tasks = server_tasks.len(),
            sessions = self.sessions.len(),
            timeout_secs = timeout.as_secs(),
            "draining"
        );

        let drain = async {
            let _ = futures::future::join_all(server_tasks).await;
            self.sessions.wait().await;
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(
                sessions = self.sessions.len(),
                "drain timed out with sessions still open"
            );
            return false;
        }
        info!("all sessions closed");
        true
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
