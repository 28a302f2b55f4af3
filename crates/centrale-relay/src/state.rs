//! Shared application state for the relay's HTTP surface.

use std::sync::Arc;

use tokio::sync::watch;

use crate::relay::RelayHandle;

/// Default limit on producer request bodies (64 KiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`](std::sync::Arc) and injected via Axum's `State`
/// extractor. Endpoints never touch relay state directly; they go through
/// the [`RelayHandle`].
#[derive(Debug, Clone)]
pub struct AppState {
    /// Handle to the relay task.
    pub relay: RelayHandle,
    /// Largest accepted request body, in bytes.
    pub max_body_bytes: usize,
    /// Upgraded `WebSocket` sessions still running.
    pub sessions: SessionTracker,
}

impl AppState {
    /// Create application state around a running relay.
    pub fn new(relay: RelayHandle) -> Self {
        Self {
            relay,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            sessions: SessionTracker::new(),
        }
    }

    /// Override the request body limit.
    #[must_use]
    pub const fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

/// Counts live `WebSocket` sessions.
///
/// Axum's graceful shutdown stops waiting once the HTTP side is idle, but
/// upgraded connections run on their own tasks. The server binary waits on
/// [`SessionTracker::wait_idle`] so every session gets to send its close
/// frame before the runtime goes away.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    live: Arc<watch::Sender<usize>>,
}

impl SessionTracker {
    /// Create a tracker with no sessions.
    #[must_use]
    pub fn new() -> Self {
        let (live, _) = watch::channel(0);
        Self {
            live: Arc::new(live),
        }
    }

    /// Record a new session. It counts as live until the guard is dropped.
    #[must_use = "the session stops counting as live when the guard is dropped"]
    pub fn enter(&self) -> SessionGuard {
        self.live.send_modify(|n| *n = n.saturating_add(1));
        SessionGuard {
            live: Arc::clone(&self.live),
        }
    }

    /// Number of sessions currently running.
    #[must_use]
    pub fn live(&self) -> usize {
        *self.live.borrow()
    }

    /// Resolve once no session is running.
    pub async fn wait_idle(&self) {
        let mut rx = self.live.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks one running session; see [`SessionTracker::enter`].
#[derive(Debug)]
pub struct SessionGuard {
    live: Arc<watch::Sender<usize>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.live.send_modify(|n| *n = n.saturating_sub(1));
    }
}
