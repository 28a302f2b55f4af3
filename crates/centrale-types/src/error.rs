//! Validation errors raised at the ingress boundary.

/// Reasons a producer submission is rejected.
///
/// Every variant is reported back to the producer; none of them touch
/// relay state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The body is not a JSON object of the expected shape (missing
    /// field, wrong type, not an object at all).
    #[error("malformed measurement: {0}")]
    Malformed(String),

    /// A numeric field does not fit a finite `f64`.
    #[error("field `{field}` must be a finite number")]
    NotFinite {
        /// Wire name of the offending field.
        field: &'static str,
    },

    /// A numeric field is outside its physical range.
    #[error("field `{field}` out of range: {value} (expected {expected})")]
    OutOfRange {
        /// Wire name of the offending field.
        field: &'static str,
        /// The rejected value, formatted.
        value: String,
        /// Human-readable description of the accepted range.
        expected: &'static str,
    },

    /// The producer-supplied timestamp is not an ISO-8601 date or date-time.
    #[error("invalid timestamp `{value}`: {reason}")]
    InvalidTimestamp {
        /// The rejected timestamp string.
        value: String,
        /// Parser diagnostic.
        reason: String,
    },
}

impl From<serde_json::Error> for ValidationError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}
