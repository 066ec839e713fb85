//! Decoding wire frames into [`QueueEvent`]s.
//!
//! Two layers:
//!
//! - [`QueueEvent::try_decode`] validates the frame against the schema of its
//!   `type` and reports the first problem as a [`DecodeError`].
//! - [`QueueEvent::decode`] never fails. When strict decoding rejects a frame
//!   of a known kind, the frame is read again leniently: absent or mistyped
//!   fields take safe defaults and numeric strings count as integers. Frames
//!   with no usable `type` become [`QueueEventBody::Error`] events with origin
//!   [`ErrorOrigin::Decode`](crate::error::ErrorOrigin::Decode).

use crate::error::{DecodeError, ErrorOrigin, QueueError, UNKNOWN_ERROR_MESSAGE};
use crate::event::{QueueEvent, QueueEventBody, QueueEventType};
use crate::vehicle::{QueueVehicle, VehicleStatus, clamp_seats};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Frames decoded by the strict path
pub const FRAMES_DECODED: &str = "queue_frames_decoded_total";
/// Frames recovered by the lenient path
pub const FRAMES_LENIENT: &str = "queue_frames_lenient_total";
/// Frames turned into decode-error events
pub const FRAMES_REJECTED: &str = "queue_frames_rejected_total";

impl DecodeError {
    /// Stable machine-readable code, used as the `code` of decode-error events
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "invalid_json",
            Self::NotAnObject => "not_an_object",
            Self::MissingType => "missing_type",
            Self::UnknownType(_) => "unknown_type",
            Self::MissingField { .. } => "missing_field",
            Self::InvalidField { .. } => "invalid_field",
        }
    }
}

impl QueueEvent {
    /// Decode a frame, validating it against the schema of its `type`.
    ///
    /// # Errors
    ///
    /// Returns the first [`DecodeError`] found: a non-object frame, a missing
    /// or unknown `type`, or a required field that is absent or mistyped.
    pub fn try_decode(value: &Value) -> Result<Self, DecodeError> {
        let object = value.as_object().ok_or(DecodeError::NotAnObject)?;
        let kind = event_type(object)?;
        decode_with(kind, Fields::new(object, Mode::Strict))
    }

    /// Decode a frame, never failing.
    #[must_use]
    pub fn decode(value: &Value) -> Self {
        match Self::try_decode(value) {
            Ok(event) => {
                counter!(FRAMES_DECODED, "type" => event.event_type().wire_name()).increment(1);
                event
            },
            Err(strict_error) => match decode_lenient(value) {
                Some(event) => {
                    tracing::warn!(
                        event_type = %event.event_type(),
                        error = %strict_error,
                        "Decoded malformed frame leniently"
                    );
                    counter!(FRAMES_LENIENT, "type" => event.event_type().wire_name()).increment(1);
                    event
                },
                None => undecodable(value, &strict_error),
            },
        }
    }

    /// Decode a raw text frame, never failing.
    ///
    /// Text that is not JSON becomes a decode-error event.
    #[must_use]
    pub fn decode_str(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::decode(&value),
            Err(e) => {
                let error = DecodeError::InvalidJson(e.to_string());
                undecodable(&Value::Null, &error)
            },
        }
    }

    /// Decode a raw text frame strictly.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidJson`] for text that is not JSON, and
    /// otherwise the errors of [`try_decode`](Self::try_decode).
    pub fn try_decode_str(raw: &str) -> Result<Self, DecodeError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
        Self::try_decode(&value)
    }
}

fn event_type(object: &Map<String, Value>) -> Result<QueueEventType, DecodeError> {
    let raw = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingType)?;
    QueueEventType::from_wire(raw).ok_or_else(|| DecodeError::UnknownType(raw.to_string()))
}

fn decode_lenient(value: &Value) -> Option<QueueEvent> {
    let object = value.as_object()?;
    let kind = event_type(object).ok()?;
    decode_with(kind, Fields::new(object, Mode::Lenient)).ok()
}

/// Error event standing in for a frame with no usable `type`.
fn undecodable(value: &Value, reason: &DecodeError) -> QueueEvent {
    tracing::warn!(error = %reason, "Rejected undecodable frame");
    counter!(FRAMES_REJECTED, "reason" => reason.code()).increment(1);

    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_ERROR_MESSAGE);
    let route_id = value.get("routeId").and_then(Value::as_str).unwrap_or_default();

    QueueEvent::error(
        route_id,
        QueueError::decode(message, Some(reason.code().to_string())),
    )
}

fn decode_with(kind: QueueEventType, fields: Fields<'_>) -> Result<QueueEvent, DecodeError> {
    let route_id = fields.string("routeId")?;
    let timestamp = fields.timestamp("timestamp")?;

    let body = match kind {
        QueueEventType::VehicleJoinedQueue => QueueEventBody::VehicleJoinedQueue {
            vehicle: fields.vehicle("vehicle")?,
        },
        QueueEventType::VehicleLeftQueue => QueueEventBody::VehicleLeftQueue {
            vehicle_id: fields.string("vehicleId")?,
        },
        QueueEventType::VehiclePositionChanged => QueueEventBody::VehiclePositionChanged {
            vehicle_id: fields.string("vehicleId")?,
            old_position: fields.count("oldPosition")?,
            new_position: fields.count("newPosition")?,
        },
        QueueEventType::VehicleSeatCountChanged => QueueEventBody::VehicleSeatCountChanged {
            vehicle_id: fields.string("vehicleId")?,
            old_seat_count: fields.integer("oldSeatCount")?,
            new_seat_count: fields.integer("newSeatCount")?,
        },
        QueueEventType::VehicleStatusChanged => QueueEventBody::VehicleStatusChanged {
            vehicle_id: fields.string("vehicleId")?,
            old_status: fields.status("oldStatus")?,
            new_status: fields.status("newStatus")?,
        },
        QueueEventType::QueueSynced => QueueEventBody::QueueSynced {
            vehicles: fields.vehicles("vehicles")?,
        },
        QueueEventType::Error => QueueEventBody::Error(QueueError {
            message: fields.message("message")?,
            code: fields.optional_string("code")?,
            origin: fields.origin("origin")?,
        }),
    };

    Ok(QueueEvent {
        route_id,
        timestamp,
        body,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Strict,
    Lenient,
}

/// Typed field access over one JSON object.
///
/// In strict mode every accessor reports absent or mistyped fields. In lenient
/// mode they fall back to defaults and never return `Err`.
#[derive(Clone, Copy)]
struct Fields<'a> {
    object: &'a Map<String, Value>,
    mode: Mode,
}

impl<'a> Fields<'a> {
    const fn new(object: &'a Map<String, Value>, mode: Mode) -> Self {
        Self { object, mode }
    }

    const fn lenient(self) -> bool {
        matches!(self.mode, Mode::Lenient)
    }

    /// Present and not null
    fn get(self, key: &str) -> Option<&'a Value> {
        self.object.get(key).filter(|value| !value.is_null())
    }

    fn missing<T>(self, key: &str, default: T) -> Result<T, DecodeError> {
        if self.lenient() {
            Ok(default)
        } else {
            Err(DecodeError::MissingField {
                field: key.to_string(),
            })
        }
    }

    fn invalid<T>(self, key: &str, expected: &'static str, default: T) -> Result<T, DecodeError> {
        if self.lenient() {
            Ok(default)
        } else {
            Err(DecodeError::InvalidField {
                field: key.to_string(),
                expected,
            })
        }
    }

    fn string(self, key: &str) -> Result<String, DecodeError> {
        match self.get(key) {
            None => self.missing(key, String::new()),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) if self.lenient() => Ok(n.to_string()),
            Some(_) => self.invalid(key, "string", String::new()),
        }
    }

    fn optional_string(self, key: &str) -> Result<Option<String>, DecodeError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) if self.lenient() => Ok(Some(n.to_string())),
            Some(_) => self.invalid(key, "string", None),
        }
    }

    /// Error message; an absent message reads as the generic one
    fn message(self, key: &str) -> Result<String, DecodeError> {
        match self.get(key) {
            None if self.lenient() => Ok(UNKNOWN_ERROR_MESSAGE.to_string()),
            None => self.missing(key, String::new()),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => self.invalid(key, "string", UNKNOWN_ERROR_MESSAGE.to_string()),
        }
    }

    fn integer(self, key: &str) -> Result<i64, DecodeError> {
        match self.get(key) {
            None => self.missing(key, 0),
            Some(Value::Number(n)) => match n.as_i64() {
                Some(i) => Ok(i),
                None if self.lenient() => Ok(lenient_float(n.as_f64())),
                None => self.invalid(key, "integer", 0),
            },
            Some(Value::String(s)) if self.lenient() => Ok(s.trim().parse().unwrap_or(0)),
            Some(_) => self.invalid(key, "integer", 0),
        }
    }

    /// Non-negative integer (positions, seat totals)
    fn count(self, key: &str) -> Result<u32, DecodeError> {
        let value = self.integer(key)?;
        match u32::try_from(value) {
            Ok(count) => Ok(count),
            Err(_) if self.lenient() => Ok(clamp_seats(value, u32::MAX)),
            Err(_) => self.invalid(key, "non-negative integer", 0),
        }
    }

    fn status(self, key: &str) -> Result<VehicleStatus, DecodeError> {
        match self.get(key) {
            None => self.missing(key, VehicleStatus::default()),
            Some(Value::String(s)) => match s.parse() {
                Ok(status) => Ok(status),
                Err(_) => self.invalid(key, "vehicle status", VehicleStatus::default()),
            },
            Some(_) => self.invalid(key, "vehicle status", VehicleStatus::default()),
        }
    }

    /// Error origin; frames pushed by the server do not name one
    fn origin(self, key: &str) -> Result<ErrorOrigin, DecodeError> {
        match self.get(key) {
            None => Ok(ErrorOrigin::Server),
            Some(value @ Value::String(_)) => match ErrorOrigin::deserialize(value) {
                Ok(origin) => Ok(origin),
                Err(_) => self.invalid(key, "error origin", ErrorOrigin::Server),
            },
            Some(_) => self.invalid(key, "error origin", ErrorOrigin::Server),
        }
    }

    fn timestamp(self, key: &str) -> Result<Option<DateTime<Utc>>, DecodeError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => match DateTime::parse_from_rfc3339(s) {
                Ok(parsed) => Ok(Some(parsed.with_timezone(&Utc))),
                Err(_) => self.invalid(key, "RFC 3339 timestamp", None),
            },
            Some(_) => self.invalid(key, "RFC 3339 timestamp", None),
        }
    }

    fn vehicle(self, key: &str) -> Result<QueueVehicle, DecodeError> {
        match self.get(key) {
            Some(Value::Object(object)) => {
                decode_vehicle(Self::new(object, self.mode)).map_err(|e| e.within(key))
            },
            None if !self.lenient() => self.missing(key, empty_vehicle()),
            Some(_) if !self.lenient() => self.invalid(key, "object", empty_vehicle()),
            _ => decode_vehicle(Fields::new(&Map::new(), self.mode)),
        }
    }

    fn vehicles(self, key: &str) -> Result<Vec<QueueVehicle>, DecodeError> {
        let items = match self.get(key) {
            Some(Value::Array(items)) => items,
            None => return self.missing(key, Vec::new()),
            Some(_) => return self.invalid(key, "array", Vec::new()),
        };

        let mut vehicles = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match item {
                Value::Object(object) => vehicles.push(
                    decode_vehicle(Self::new(object, self.mode))
                        .map_err(|e| e.within(&format!("{key}[{index}]")))?,
                ),
                // Lenient reads skip entries that are not vehicles at all
                _ if self.lenient() => {},
                _ => {
                    return self.invalid(&format!("{key}[{index}]"), "object", Vec::new());
                },
            }
        }
        Ok(vehicles)
    }
}

fn decode_vehicle(fields: Fields<'_>) -> Result<QueueVehicle, DecodeError> {
    let total_seats = fields.count("totalSeats")?;
    let available_seats = clamp_seats(fields.integer("availableSeats")?, total_seats);

    Ok(QueueVehicle {
        id: fields.string("id")?,
        vehicle_id: fields.string("vehicleId")?,
        registration_number: fields.string("registrationNumber")?,
        route_id: fields.string("routeId")?,
        position: fields.count("position")?,
        status: fields.status("status")?,
        total_seats,
        available_seats,
        driver_name: fields.optional_string("driverName")?,
        estimated_departure_time: fields.timestamp("estimatedDepartureTime")?,
    })
}

fn empty_vehicle() -> QueueVehicle {
    QueueVehicle::new("", "", "", 0, 0)
}

#[allow(clippy::cast_possible_truncation)] // Saturating float-to-int cast
fn lenient_float(value: Option<f64>) -> i64 {
    value.filter(|f| f.is_finite()).map_or(0, |f| f.trunc() as i64)
}
