//! Axum router construction for the relay.
//!
//! Assembles the REST and `WebSocket` routes into a single [`Router`] with
//! permissive CORS so dashboards served from any origin can reach it.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router for the relay.
///
/// The router includes:
/// - `GET /` -- `WebSocket` measurement stream (original client contract)
/// - `GET /ws/measurements` -- same stream under an explicit path
/// - `POST /api/measurements` -- producer ingress
/// - `GET /api/measurements/latest` -- latest measurement
/// - `GET /api/status` -- relay counters
///
/// CORS allows any origin. This relay trusts its network perimeter and is
/// meant for local or plant-floor deployments.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        // WebSocket
        .route("/", get(ws::ws_measurements))
        .route("/ws/measurements", get(ws::ws_measurements))
        // REST API
        .route("/api/measurements", post(handlers::submit_measurement))
        .route("/api/measurements/latest", get(handlers::latest_measurement))
        .route("/api/status", get(handlers::status))
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
