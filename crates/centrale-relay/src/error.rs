//! Error types for the relay's HTTP endpoints.
//!
//! [`ApiError`] unifies every failure a producer or dashboard can see into
//! a single enum that converts into a JSON response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.
//! Delivery failures never appear here: they are handled inside the fan-out
//! and only ever show up to a subscriber as a closed connection.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use centrale_types::ValidationError;

use crate::relay::RelayError;

/// Errors that can occur in the relay's HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The submitted measurement failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The request body could not be read as JSON at all (wrong content
    /// type, syntax error, too large).
    #[error("{message}")]
    Rejected {
        /// Status chosen by the extractor.
        status: StatusCode,
        /// Extractor diagnostic.
        message: String,
    },

    /// No measurement has been received yet.
    #[error("no data yet")]
    NoData,

    /// The relay task could not service the request.
    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl ApiError {
    /// HTTP status for this error.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Rejected { status, .. } => *status,
            Self::NoData => StatusCode::NOT_FOUND,
            Self::Relay(RelayError::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Relay(RelayError::Encode(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the error answers a producer submission.
    const fn is_ingress(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Rejected { .. })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = if self.is_ingress() {
            serde_json::json!({
                "ok": false,
                "error": self.to_string(),
                "status": status.as_u16(),
            })
        } else {
            serde_json::json!({
                "error": self.to_string(),
                "status": status.as_u16(),
            })
        };

        (status, axum::Json(body)).into_response()
    }
}
