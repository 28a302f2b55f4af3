//! The measurement record pushed by producers and fanned out to dashboards.
//!
//! A [`Measurement`] is a full snapshot of one meter's electrical readings,
//! never a delta. Producers submit a [`MeasurementSubmission`]; the relay
//! validates it and stamps a receipt time when the producer did not supply
//! one.
//!
//! | Field | Unit |
//! |-------|------|
//! | `voltage` | V |
//! | `current` | A |
//! | `activePower` | kW |
//! | `reactivePower` | kVAR |
//! | `energy` | kWh |
//! | `frequency` | Hz |
//! | `powerFactor` | unitless, 0 to 1 |
//!
//! Readings are held as [`serde_json::Number`] and extra producer fields
//! are carried along untouched, so a stored measurement re-encodes to the
//! body the producer sent (`230` stays `230`, `meterId` survives).

use std::ops::RangeInclusive;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use ts_rs::TS;

use crate::error::ValidationError;

/// Accepted range for `powerFactor`.
const POWER_FACTOR_RANGE: RangeInclusive<f64> = 0.0..=1.0;

/// ISO-8601 local date-time layouts accepted when no offset is given.
/// `%.f` also matches an absent fraction.
const LOCAL_DATE_TIME_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Offset date-time layouts RFC 3339 does not cover (`+0200`, no seconds).
const OFFSET_DATE_TIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M%:z"];

/// One timestamped snapshot of electrical readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Measurement {
    /// RMS voltage in volts.
    #[ts(type = "number")]
    pub voltage: Number,
    /// RMS current in amperes.
    #[ts(type = "number")]
    pub current: Number,
    /// Active power in kilowatts.
    #[ts(type = "number")]
    pub active_power: Number,
    /// Reactive power in kilovolt-amperes reactive.
    #[ts(type = "number")]
    pub reactive_power: Number,
    /// Cumulative energy in kilowatt-hours.
    #[ts(type = "number")]
    pub energy: Number,
    /// Line frequency in hertz.
    #[ts(type = "number")]
    pub frequency: Number,
    /// Power factor, 0 to 1.
    #[ts(type = "number")]
    pub power_factor: Number,
    /// ISO-8601 timestamp, producer-supplied or assigned on receipt.
    pub timestamp: String,
    /// Producer fields the relay does not interpret, passed through as sent.
    #[serde(flatten)]
    #[ts(skip)]
    pub extra: Map<String, Value>,
}

/// Body of `POST /api/measurements` before validation.
///
/// Identical to [`Measurement`] except that `timestamp` may be omitted.
/// Unknown fields are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct MeasurementSubmission {
    /// RMS voltage in volts.
    #[ts(type = "number")]
    pub voltage: Number,
    /// RMS current in amperes.
    #[ts(type = "number")]
    pub current: Number,
    /// Active power in kilowatts.
    #[ts(type = "number")]
    pub active_power: Number,
    /// Reactive power in kilovolt-amperes reactive.
    #[ts(type = "number")]
    pub reactive_power: Number,
    /// Cumulative energy in kilowatt-hours.
    #[ts(type = "number")]
    pub energy: Number,
    /// Line frequency in hertz.
    #[ts(type = "number")]
    pub frequency: Number,
    /// Power factor, 0 to 1.
    #[ts(type = "number")]
    pub power_factor: Number,
    /// Optional ISO-8601 timestamp.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub timestamp: Option<String>,
    /// Producer fields the relay does not interpret.
    #[serde(flatten)]
    #[ts(skip)]
    pub extra: Map<String, Value>,
}

impl MeasurementSubmission {
    /// Parse a submission from an arbitrary JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Malformed`] if the value is not an object
    /// carrying all seven numeric fields.
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Validate the submission and turn it into a [`Measurement`].
    ///
    /// A missing timestamp is filled from `received_at` in the same format
    /// JavaScript's `Date.prototype.toISOString` produces
    /// (`2024-05-01T12:00:00.000Z`). A supplied timestamp must be ISO-8601
    /// (with or without an offset, or a bare date) and is kept verbatim so
    /// consumers see exactly what the producer sent.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::OutOfRange`] for a `powerFactor` outside
    /// 0 to 1 and [`ValidationError::InvalidTimestamp`] for a timestamp that
    /// is not ISO-8601.
    pub fn validate(self, received_at: DateTime<Utc>) -> Result<Measurement, ValidationError> {
        for (field, value) in [
            ("voltage", &self.voltage),
            ("current", &self.current),
            ("activePower", &self.active_power),
            ("reactivePower", &self.reactive_power),
            ("energy", &self.energy),
            ("frequency", &self.frequency),
        ] {
            finite(field, value)?;
        }
        within(
            "powerFactor",
            &self.power_factor,
            &POWER_FACTOR_RANGE,
            "0 to 1",
        )?;

        let timestamp = match self.timestamp {
            Some(ts) => {
                if let Err(e) = parse_iso8601(&ts) {
                    return Err(ValidationError::InvalidTimestamp {
                        value: ts,
                        reason: e.to_string(),
                    });
                }
                ts
            }
            None => received_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        Ok(Measurement {
            voltage: self.voltage,
            current: self.current,
            active_power: self.active_power,
            reactive_power: self.reactive_power,
            energy: self.energy,
            frequency: self.frequency,
            power_factor: self.power_factor,
            timestamp,
            extra: self.extra,
        })
    }
}

/// Check that `value` is an ISO-8601 date or date-time.
///
/// Tries RFC 3339 first, then the offset and local layouts, then a bare
/// calendar date. The error of the last attempt is reported.
fn parse_iso8601(value: &str) -> Result<(), chrono::ParseError> {
    if DateTime::parse_from_rfc3339(value).is_ok()
        || OFFSET_DATE_TIME_FORMATS
            .iter()
            .any(|format| DateTime::parse_from_str(value, format).is_ok())
        || LOCAL_DATE_TIME_FORMATS
            .iter()
            .any(|format| NaiveDateTime::parse_from_str(value, format).is_ok())
    {
        return Ok(());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map(drop)
}

fn finite(field: &'static str, value: &Number) -> Result<f64, ValidationError> {
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or(ValidationError::NotFinite { field })
}

fn within(
    field: &'static str,
    value: &Number,
    range: &RangeInclusive<f64>,
    expected: &'static str,
) -> Result<f64, ValidationError> {
    let reading = finite(field, value)?;
    if range.contains(&reading) {
        Ok(reading)
    } else {
        Err(ValidationError::OutOfRange {
            field,
            value: value.to_string(),
            expected,
        })
    }
}
