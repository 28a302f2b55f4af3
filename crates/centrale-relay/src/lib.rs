//! Live measurement relay for industrial electrical telemetry.
//!
//! Producers (metering devices) push readings over HTTP; dashboards hold a
//! `WebSocket` open and receive every new reading as it arrives.
//!
//! - **Ingress** (`POST /api/measurements`) validates a submission, stores
//!   it as the latest value and fans it out
//! - **Latest** (`GET /api/measurements/latest`) returns the current value
//! - **Subscription** (`GET /` or `GET /ws/measurements`, upgraded to a
//!   `WebSocket`) pushes the latest value on connect, then every publish
//!
//! # Architecture
//!
//! A single [`Relay`] task owns the [`MeasurementStore`] and the
//! [`SubscriberRegistry`]. Endpoints talk to it through a cloneable
//! [`RelayHandle`] by message passing, so every command runs to completion
//! before the next one starts: publishes never interleave, and a
//! subscriber sees measurements in the order they were ingested.
//!
//! Fan-out is best effort. A subscriber whose queue is closed or full is
//! dropped from the registry during the pass that failed to reach it, and
//! the other subscribers are unaffected.
//!
//! [`Relay`]: relay::Relay
//! [`RelayHandle`]: relay::RelayHandle
//! [`MeasurementStore`]: store::MeasurementStore
//! [`SubscriberRegistry`]: registry::SubscriberRegistry

pub mod broadcast;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod relay;
pub mod router;
pub mod server;
pub mod state;
pub mod store;
pub mod ws;

// Re-export primary types for convenience.
pub use relay::{spawn_relay, RelayError, RelayHandle, RelayOptions};
pub use router::build_router;
pub use server::{start_server, ServerConfig, ServerError};
pub use state::{AppState, SessionTracker};
