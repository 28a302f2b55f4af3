//! Registry of live subscriber connections.
//!
//! Each connection is represented by the sending half of its outbound
//! frame queue. The registry owns those senders exclusively; the broadcast
//! engine only ever sees a point-in-time [`snapshot`](SubscriberRegistry::snapshot)
//! of them.

use std::collections::HashMap;

use centrale_types::SubscriberId;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::broadcast::Frame;

/// Sending half of a subscriber's outbound queue, paired with its ID.
#[derive(Debug, Clone)]
pub struct SubscriberHandle {
    /// Session identifier.
    pub id: SubscriberId,
    /// Outbound frame queue for this session.
    pub tx: mpsc::Sender<Frame>,
}

#[derive(Debug)]
struct Entry {
    tx: mpsc::Sender<Frame>,
    connected_at: DateTime<Utc>,
}

/// Set of currently connected subscribers.
///
/// Membership semantics only: iteration order is unspecified.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    entries: HashMap<SubscriberId, Entry>,
}

impl SubscriberRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to the live set and return the handle used to
    /// remove it later.
    pub fn register(&mut self, tx: mpsc::Sender<Frame>) -> SubscriberId {
        let id = SubscriberId::new();
        self.entries.insert(
            id,
            Entry {
                tx,
                connected_at: Utc::now(),
            },
        );
        id
    }

    /// Remove a connection. Idempotent: unknown or already-removed IDs are
    /// a no-op.
    ///
    /// Returns how long the connection was registered, or `None` if it was
    /// not present. Dropping the stored sender closes the subscriber's
    /// queue once it has drained.
    pub fn unregister(&mut self, id: SubscriberId) -> Option<chrono::Duration> {
        self.entries
            .remove(&id)
            .map(|entry| Utc::now().signed_duration_since(entry.connected_at))
    }

    /// Point-in-time copy of the live set.
    ///
    /// Registering or unregistering while the copy is being iterated has no
    /// effect on it.
    pub fn snapshot(&self) -> Vec<SubscriberHandle> {
        self.entries
            .iter()
            .map(|(id, entry)| SubscriberHandle {
                id: *id,
                tx: entry.tx.clone(),
            })
            .collect()
    }

    /// Whether the given connection is currently registered.
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
