//! REST endpoint handlers.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/measurements` | Submit a measurement (producers) |
//! | `GET` | `/api/measurements/latest` | Latest measurement or 404 |
//! | `GET` | `/api/status` | Subscriber and publish counters |

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use centrale_types::{Measurement, MeasurementSubmission};
use chrono::Utc;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::relay::RelayStatus;
use crate::state::AppState;

/// Acknowledgement returned to producers.
#[derive(Debug, serde::Serialize)]
pub struct SubmitResponse {
    /// Always `true`; failures use [`ApiError`].
    pub ok: bool,
}

// ---------------------------------------------------------------------------
// POST /api/measurements
// ---------------------------------------------------------------------------

/// Accept a measurement from a producer, store it, and fan it out.
///
/// The producer only learns that the submission was accepted. Whether any
/// dashboard received it is not reported.
pub async fn submit_measurement(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let Json(body) = payload.inspect_err(|rejection| {
        warn!(error = %rejection, "Rejected unreadable measurement body");
    })?;

    let measurement = MeasurementSubmission::from_value(body)
        .and_then(|submission| submission.validate(Utc::now()))
        .inspect_err(|e| warn!(error = %e, "Rejected invalid measurement"))?;

    let receipt = state.relay.ingest(measurement).await?;
    debug!(
        sequence = receipt.sequence,
        delivered = receipt.delivered,
        "Measurement accepted"
    );

    Ok(Json(SubmitResponse { ok: true }))
}

// ---------------------------------------------------------------------------
// GET /api/measurements/latest
// ---------------------------------------------------------------------------

/// Return the most recent measurement, or 404 if none has arrived yet.
pub async fn latest_measurement(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Measurement>, ApiError> {
    state
        .relay
        .latest()
        .await?
        .map(Json)
        .ok_or(ApiError::NoData)
}

// ---------------------------------------------------------------------------
// GET /api/status
// ---------------------------------------------------------------------------

/// Report live relay counters.
pub async fn status(State(state): State<Arc<AppState>>) -> Result<Json<RelayStatus>, ApiError> {
    Ok(Json(state.relay.status().await?))
}
