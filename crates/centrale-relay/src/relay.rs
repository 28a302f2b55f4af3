//! The relay event loop.
//!
//! One Tokio task owns the [`MeasurementStore`] and the
//! [`SubscriberRegistry`]. Everything else talks to it through a
//! [`RelayHandle`], which turns each call into a [`RelayCommand`] message
//! and awaits the reply.
//!
//! Commands are handled strictly one at a time and no handler awaits, so:
//!
//! - a publish completes its whole fan-out pass before the next command
//!   is looked at, and per-connection order matches ingest order;
//! - a new subscriber gets the snapshot queued and is registered in the
//!   same step, so it sees the latest value first and then every later
//!   publish;
//! - no other code can observe a half-updated store or registry.

use centrale_types::{Measurement, SubscriberId};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broadcast::{self, Frame};
use crate::registry::SubscriberRegistry;
use crate::store::MeasurementStore;

/// Default capacity of each subscriber's outbound queue.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

/// Default capacity of the command queue feeding the relay task.
pub const DEFAULT_COMMAND_BUFFER: usize = 1024;

/// Tuning knobs for the relay task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOptions {
    /// Frames a subscriber may have queued before it is dropped as lagging.
    pub subscriber_buffer: usize,
    /// Commands that may be pending before callers wait for room.
    pub command_buffer: usize,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            command_buffer: DEFAULT_COMMAND_BUFFER,
        }
    }
}

/// Errors returned through a [`RelayHandle`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// The relay task has stopped (shutdown or crash).
    #[error("relay is not running")]
    Unavailable,

    /// The measurement could not be encoded for the wire.
    #[error("failed to encode measurement: {0}")]
    Encode(String),
}

/// Acknowledgement for one ingested measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReceipt {
    /// Position of this measurement in the relay's publish sequence,
    /// starting at 1.
    pub sequence: u64,
    /// Subscribers the measurement was queued for.
    pub delivered: usize,
    /// Subscribers dropped because delivery failed.
    pub dropped: usize,
}

/// Live counters reported by `GET /api/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatus {
    /// Number of registered subscribers.
    pub subscribers: usize,
    /// Whether a latest measurement is available.
    pub has_measurement: bool,
    /// Measurements published since startup.
    pub published: u64,
}

/// A registered subscriber session.
///
/// Dropping `frames` is enough to be removed on the next publish, but
/// sessions should call [`RelayHandle::unsubscribe`] so removal is prompt.
#[derive(Debug)]
pub struct Subscription {
    /// Identifier to pass to [`RelayHandle::unsubscribe`].
    pub id: SubscriberId,
    /// Frames to forward to the client, in publish order. Yields `None`
    /// once the relay has dropped this subscriber or shut down.
    pub frames: mpsc::Receiver<Frame>,
}

/// Messages processed by the relay task.
#[derive(Debug)]
enum RelayCommand {
    Ingest {
        measurement: Measurement,
        reply: oneshot::Sender<Result<IngestReceipt, RelayError>>,
    },
    Latest {
        reply: oneshot::Sender<Option<Measurement>>,
    },
    Subscribe {
        reply: oneshot::Sender<Subscription>,
    },
    Unsubscribe {
        id: SubscriberId,
    },
    Status {
        reply: oneshot::Sender<RelayStatus>,
    },
    Shutdown,
}

/// Cloneable entry point to the relay task.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    tx: mpsc::Sender<RelayCommand>,
}

impl RelayHandle {
    /// Store `measurement` as the latest value and fan it out.
    ///
    /// Resolves once the fan-out pass has queued the frame for every live
    /// subscriber. This is a submission acknowledgement, not a delivery
    /// confirmation.
    pub async fn ingest(&self, measurement: Measurement) -> Result<IngestReceipt, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.send(RelayCommand::Ingest { measurement, reply }).await?;
        rx.await.map_err(|_dropped| RelayError::Unavailable)?
    }

    /// The latest measurement, if one has been ingested.
    pub async fn latest(&self) -> Result<Option<Measurement>, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.send(RelayCommand::Latest { reply }).await?;
        rx.await.map_err(|_dropped| RelayError::Unavailable)
    }

    /// Register a new subscriber.
    ///
    /// If a measurement is stored, it is already queued as the first frame
    /// of the returned subscription.
    pub async fn subscribe(&self) -> Result<Subscription, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.send(RelayCommand::Subscribe { reply }).await?;
        rx.await.map_err(|_dropped| RelayError::Unavailable)
    }

    /// Remove a subscriber. Safe to call repeatedly, with an unknown ID,
    /// or after the relay has stopped.
    pub async fn unsubscribe(&self, id: SubscriberId) {
        // A stopped relay has no registry left to remove from.
        let _ = self.send(RelayCommand::Unsubscribe { id }).await;
    }

    /// Current counters.
    pub async fn status(&self) -> Result<RelayStatus, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.send(RelayCommand::Status { reply }).await?;
        rx.await.map_err(|_dropped| RelayError::Unavailable)
    }

    /// Stop the relay task. Every subscriber queue is closed, which ends
    /// the corresponding sessions. Idempotent.
    pub async fn shutdown(&self) {
        let _ = self.send(RelayCommand::Shutdown).await;
    }

    /// Whether the relay task is still accepting commands.
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    async fn send(&self, command: RelayCommand) -> Result<(), RelayError> {
        self.tx
            .send(command)
            .await
            .map_err(|_stopped| RelayError::Unavailable)
    }
}

/// State owned by the relay task.
#[derive(Debug)]
pub struct Relay {
    store: MeasurementStore,
    registry: SubscriberRegistry,
    subscriber_buffer: usize,
    published: u64,
    commands: mpsc::Receiver<RelayCommand>,
}

impl Relay {
    /// Create the relay state and the handle used to reach it.
    ///
    /// Nothing runs until [`Relay::run`] is polled.
    pub fn new(options: RelayOptions) -> (Self, RelayHandle) {
        let (tx, commands) = mpsc::channel(options.command_buffer.max(1));
        let relay = Self {
            store: MeasurementStore::new(),
            registry: SubscriberRegistry::new(),
            subscriber_buffer: options.subscriber_buffer.max(1),
            published: 0,
            commands,
        };
        (relay, RelayHandle { tx })
    }

    /// Process commands until shutdown is requested or every handle is
    /// dropped.
    pub async fn run(mut self) {
        info!(
            subscriber_buffer = self.subscriber_buffer,
            "Relay event loop started"
        );

        while let Some(command) = self.commands.recv().await {
            if !self.handle(command) {
                break;
            }
        }

        self.commands.close();
        let subscribers = self.registry.len();
        info!(
            subscribers,
            published = self.published,
            "Relay event loop stopped, closing subscriber queues"
        );
    }

    /// Apply one command. Returns `false` when the loop should stop.
    fn handle(&mut self, command: RelayCommand) -> bool {
        match command {
            RelayCommand::Ingest { measurement, reply } => {
                let result = self.ingest(measurement);
                let _ = reply.send(result);
            }
            RelayCommand::Latest { reply } => {
                let _ = reply.send(self.store.get().cloned());
            }
            RelayCommand::Subscribe { reply } => self.subscribe(reply),
            RelayCommand::Unsubscribe { id } => self.unsubscribe(id),
            RelayCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
            RelayCommand::Shutdown => return false,
        }
        true
    }

    fn ingest(&mut self, measurement: Measurement) -> Result<IngestReceipt, RelayError> {
        let report = broadcast::publish(&mut self.registry, &measurement)
            .map_err(|e| RelayError::Encode(e.to_string()))?;
        self.store.set(measurement);
        self.published = self.published.saturating_add(1);

        debug!(
            sequence = self.published,
            delivered = report.delivered,
            dropped = report.failed.len(),
            "Measurement published"
        );

        Ok(IngestReceipt {
            sequence: self.published,
            delivered: report.delivered,
            dropped: report.failed.len(),
        })
    }

    fn subscribe(&mut self, reply: oneshot::Sender<Subscription>) {
        let (tx, frames) = mpsc::channel(self.subscriber_buffer);

        if let Some(latest) = self.store.get() {
            match broadcast::encode_frame(latest) {
                Ok(frame) => {
                    // The queue is fresh and has room for at least one frame.
                    if tx.try_send(frame).is_err() {
                        warn!("Could not queue snapshot for new subscriber");
                    }
                }
                Err(e) => warn!(error = %e, "Failed to encode snapshot for new subscriber"),
            }
        }

        let id = self.registry.register(tx);

        if reply.send(Subscription { id, frames }).is_err() {
            // The requester went away before the handshake finished.
            self.registry.unregister(id);
            debug!(subscriber = %id, "Subscriber abandoned during registration");
            return;
        }

        info!(
            subscriber = %id,
            subscribers = self.registry.len(),
            snapshot = !self.store.is_empty(),
            "Subscriber registered"
        );
    }

    fn unsubscribe(&mut self, id: SubscriberId) {
        if let Some(connected_for) = self.registry.unregister(id) {
            info!(
                subscriber = %id,
                subscribers = self.registry.len(),
                connected_secs = connected_for.num_seconds(),
                "Subscriber unregistered"
            );
        }
    }

    fn status(&self) -> RelayStatus {
        RelayStatus {
            subscribers: self.registry.len(),
            has_measurement: !self.store.is_empty(),
            published: self.published,
        }
    }
}

/// Spawn the relay task on the current Tokio runtime.
///
/// The returned [`JoinHandle`] completes after [`RelayHandle::shutdown`] or
/// once every handle has been dropped.
pub fn spawn_relay(options: RelayOptions) -> (RelayHandle, JoinHandle<()>) {
    let (relay, handle) = Relay::new(options);
    let task = tokio::spawn(relay.run());
    (handle, task)
}
