//! Fan-out of a measurement to every live subscriber.
//!
//! A measurement is serialized once into a [`Frame`] and the same frame is
//! queued on every subscriber's outbound channel with a non-blocking
//! `try_send`. Delivery is best effort and at most once per publish:
//!
//! - A closed queue means the session is gone.
//! - A full queue means the consumer cannot keep up.
//!
//! Both are a [`DeliveryError`]. The failing subscriber is removed from the
//! registry in the same pass and the error is logged, never returned to
//! the producer and never seen by other subscribers.

use axum::extract::ws::Utf8Bytes;
use centrale_types::{Measurement, SubscriberId};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::registry::SubscriberRegistry;

/// A serialized measurement, shared by reference across all subscriber
/// queues and written to the socket without re-encoding.
pub type Frame = Utf8Bytes;

/// Why one subscriber could not be handed a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The session dropped its end of the queue.
    #[error("subscriber connection closed")]
    Closed,

    /// The session's queue is full.
    #[error("subscriber lagging ({capacity} frames queued)")]
    Lagging {
        /// Queue capacity that was exhausted.
        capacity: usize,
    },
}

/// Outcome of one fan-out pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    /// Number of subscribers in the snapshot the pass iterated.
    pub attempted: usize,
    /// Number of subscribers the frame was queued for.
    pub delivered: usize,
    /// Subscribers that failed and were removed from the registry.
    pub failed: Vec<(SubscriberId, DeliveryError)>,
}

/// Serialize a measurement into the wire frame sent to subscribers.
pub fn encode_frame(measurement: &Measurement) -> Result<Frame, serde_json::Error> {
    serde_json::to_string(measurement).map(Utf8Bytes::from)
}

/// Serialize `measurement` once and fan it out to every live subscriber.
pub fn publish(
    registry: &mut SubscriberRegistry,
    measurement: &Measurement,
) -> Result<FanOutReport, serde_json::Error> {
    let frame = encode_frame(measurement)?;
    Ok(fan_out(registry, &frame))
}

/// Queue `frame` on every subscriber in the registry's current snapshot.
///
/// Subscribers that fail are unregistered before returning.
pub fn fan_out(registry: &mut SubscriberRegistry, frame: &Frame) -> FanOutReport {
    let targets = registry.snapshot();
    let mut report = FanOutReport {
        attempted: targets.len(),
        ..FanOutReport::default()
    };

    for target in targets {
        match target.tx.try_send(frame.clone()) {
            Ok(()) => {
                report.delivered = report.delivered.saturating_add(1);
            }
            Err(TrySendError::Closed(_)) => {
                report.failed.push((target.id, DeliveryError::Closed));
            }
            Err(TrySendError::Full(_)) => {
                report.failed.push((
                    target.id,
                    DeliveryError::Lagging {
                        capacity: target.tx.max_capacity(),
                    },
                ));
            }
        }
    }

    for (id, error) in &report.failed {
        registry.unregister(*id);
        warn!(subscriber = %id, error = %error, "Dropping subscriber after failed delivery");
    }

    debug!(
        attempted = report.attempted,
        delivered = report.delivered,
        failed = report.failed.len(),
        "Fan-out complete"
    );

    report
}
