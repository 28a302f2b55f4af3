//! Shared type definitions for the Centrale measurement relay.
//!
//! This crate is the single source of truth for everything that crosses
//! the relay's wire boundary. Types defined here flow downstream to
//! `TypeScript` via `ts-rs` for the measurement dashboard.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrapper for subscriber sessions
//! - [`enums`] -- Connection lifecycle states
//! - [`measurement`] -- The measurement record and its ingress submission
//! - [`error`] -- Validation failures reported back to producers

pub mod enums;
pub mod error;
pub mod ids;
pub mod measurement;

// Re-export all public types at crate root for convenience.
pub use enums::ConnectionState;
pub use error::ValidationError;
pub use ids::SubscriberId;
pub use measurement::{Measurement, MeasurementSubmission};
