//! Single-slot store for the most recent measurement.
//!
//! This is deliberately not a time series. Chart history is kept by
//! consumers; the relay only remembers what a late-joining dashboard
//! needs to render its first frame.

use centrale_types::Measurement;

/// Holds at most one [`Measurement`]: the last one received.
///
/// Owned by the relay task, so `set` and `get` never race. Readers cannot
/// observe a partially written value.
#[derive(Debug, Default)]
pub struct MeasurementStore {
    latest: Option<Measurement>,
}

impl MeasurementStore {
    /// Create an empty store.
    pub const fn new() -> Self {
        Self { latest: None }
    }

    /// Replace the current value unconditionally (last write wins).
    ///
    /// Returns the value that was replaced, if any.
    pub fn set(&mut self, measurement: Measurement) -> Option<Measurement> {
        self.latest.replace(measurement)
    }

    /// The current value, or `None` if nothing has been received yet.
    pub const fn get(&self) -> Option<&Measurement> {
        self.latest.as_ref()
    }

    /// Whether no measurement has ever been stored.
    pub const fn is_empty(&self) -> bool {
        self.latest.is_none()
    }
}
