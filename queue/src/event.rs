//! Queue events pushed by the server.
//!
//! Every frame on the queue socket is one JSON object discriminated by its
//! `type` field. [`QueueEvent`] is the typed form: an envelope (`route_id`,
//! optional server `timestamp`) around one of seven [`QueueEventBody`]
//! variants. Decoding lives in [`crate::decode`].

use crate::error::{ErrorOrigin, QueueError};
use crate::vehicle::{QueueVehicle, VehicleStatus};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use std::fmt;

/// The seven kinds of queue event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueEventType {
    /// A vehicle entered the queue
    VehicleJoinedQueue,
    /// A vehicle left the queue
    VehicleLeftQueue,
    /// A vehicle moved to another rank
    VehiclePositionChanged,
    /// A vehicle's free seat count changed
    VehicleSeatCountChanged,
    /// A vehicle's lifecycle status changed
    VehicleStatusChanged,
    /// Authoritative snapshot of the whole queue
    QueueSynced,
    /// The server reported an error
    Error,
}

impl QueueEventType {
    /// Every kind, in wire-documentation order
    pub const ALL: [Self; 7] = [
        Self::VehicleJoinedQueue,
        Self::VehicleLeftQueue,
        Self::VehiclePositionChanged,
        Self::VehicleSeatCountChanged,
        Self::VehicleStatusChanged,
        Self::QueueSynced,
        Self::Error,
    ];

    /// Canonical wire name (camelCase)
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::VehicleJoinedQueue => "vehicleJoinedQueue",
            Self::VehicleLeftQueue => "vehicleLeftQueue",
            Self::VehiclePositionChanged => "vehiclePositionChanged",
            Self::VehicleSeatCountChanged => "vehicleSeatCountChanged",
            Self::VehicleStatusChanged => "vehicleStatusChanged",
            Self::QueueSynced => "queueSynced",
            Self::Error => "error",
        }
    }

    /// Resolve a wire `type` string.
    ///
    /// Matching ignores case, underscores and hyphens, so
    /// `vehicle_joined_queue` and `VehicleJoinedQueue` name the same kind.
    /// `queue_error` is accepted as an alias of `error`.
    #[must_use]
    pub fn from_wire(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .chars()
            .filter(|c| !matches!(c, '_' | '-'))
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match normalized.trim() {
            "vehiclejoinedqueue" => Some(Self::VehicleJoinedQueue),
            "vehicleleftqueue" => Some(Self::VehicleLeftQueue),
            "vehiclepositionchanged" => Some(Self::VehiclePositionChanged),
            "vehicleseatcountchanged" => Some(Self::VehicleSeatCountChanged),
            "vehiclestatuschanged" => Some(Self::VehicleStatusChanged),
            "queuesynced" => Some(Self::QueueSynced),
            "error" | "queueerror" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for QueueEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Payload of a queue event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEventBody {
    /// A vehicle entered the queue (or re-announced itself)
    VehicleJoinedQueue {
        /// The vehicle as it now stands
        vehicle: QueueVehicle,
    },
    /// A vehicle left the queue
    VehicleLeftQueue {
        /// Vehicle that left
        vehicle_id: String,
    },
    /// A vehicle moved to another rank
    VehiclePositionChanged {
        /// Vehicle that moved
        vehicle_id: String,
        /// Rank before the move
        old_position: u32,
        /// Rank after the move
        new_position: u32,
    },
    /// A vehicle's free seat count changed
    ///
    /// Counts are signed: the server may report values outside
    /// `0..=total_seats`, which the reducer clamps.
    VehicleSeatCountChanged {
        /// Vehicle whose seats changed
        vehicle_id: String,
        /// Free seats before
        old_seat_count: i64,
        /// Free seats after
        new_seat_count: i64,
    },
    /// A vehicle's lifecycle status changed
    VehicleStatusChanged {
        /// Vehicle whose status changed
        vehicle_id: String,
        /// Status before
        old_status: VehicleStatus,
        /// Status after
        new_status: VehicleStatus,
    },
    /// Authoritative snapshot replacing the whole queue
    QueueSynced {
        /// Every vehicle currently queued
        vehicles: Vec<QueueVehicle>,
    },
    /// An error signal; never mutates the vehicle list
    Error(QueueError),
}

impl QueueEventBody {
    /// Kind of this payload
    #[must_use]
    pub const fn event_type(&self) -> QueueEventType {
        match self {
            Self::VehicleJoinedQueue { .. } => QueueEventType::VehicleJoinedQueue,
            Self::VehicleLeftQueue { .. } => QueueEventType::VehicleLeftQueue,
            Self::VehiclePositionChanged { .. } => QueueEventType::VehiclePositionChanged,
            Self::VehicleSeatCountChanged { .. } => QueueEventType::VehicleSeatCountChanged,
            Self::VehicleStatusChanged { .. } => QueueEventType::VehicleStatusChanged,
            Self::QueueSynced { .. } => QueueEventType::QueueSynced,
            Self::Error(_) => QueueEventType::Error,
        }
    }

    /// The single vehicle this payload targets, if any
    #[must_use]
    pub fn vehicle_id(&self) -> Option<&str> {
        match self {
            Self::VehicleJoinedQueue { vehicle } => Some(&vehicle.vehicle_id),
            Self::VehicleLeftQueue { vehicle_id }
            | Self::VehiclePositionChanged { vehicle_id, .. }
            | Self::VehicleSeatCountChanged { vehicle_id, .. }
            | Self::VehicleStatusChanged { vehicle_id, .. } => Some(vehicle_id),
            Self::QueueSynced { .. } | Self::Error(_) => None,
        }
    }
}

/// One decoded queue frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEvent {
    /// Route the event belongs to (empty when the frame did not say)
    pub route_id: String,
    /// Server time of the event, when sent and well-formed
    pub timestamp: Option<DateTime<Utc>>,
    /// What happened
    pub body: QueueEventBody,
}

impl QueueEvent {
    /// Create an event without a server timestamp
    #[must_use]
    pub fn new(route_id: impl Into<String>, body: QueueEventBody) -> Self {
        Self {
            route_id: route_id.into(),
            timestamp: None,
            body,
        }
    }

    /// Attach a server timestamp
    #[must_use]
    pub const fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Vehicle joined (or re-announced) on the vehicle's own route
    #[must_use]
    pub fn joined(vehicle: QueueVehicle) -> Self {
        Self::new(vehicle.route_id.clone(), QueueEventBody::VehicleJoinedQueue { vehicle })
    }

    /// Vehicle left
    #[must_use]
    pub fn left(route_id: impl Into<String>, vehicle_id: impl Into<String>) -> Self {
        Self::new(
            route_id,
            QueueEventBody::VehicleLeftQueue {
                vehicle_id: vehicle_id.into(),
            },
        )
    }

    /// Vehicle moved
    #[must_use]
    pub fn position_changed(
        route_id: impl Into<String>,
        vehicle_id: impl Into<String>,
        old_position: u32,
        new_position: u32,
    ) -> Self {
        Self::new(
            route_id,
            QueueEventBody::VehiclePositionChanged {
                vehicle_id: vehicle_id.into(),
                old_position,
                new_position,
            },
        )
    }

    /// Free seats changed
    #[must_use]
    pub fn seat_count_changed(
        route_id: impl Into<String>,
        vehicle_id: impl Into<String>,
        old_seat_count: i64,
        new_seat_count: i64,
    ) -> Self {
        Self::new(
            route_id,
            QueueEventBody::VehicleSeatCountChanged {
                vehicle_id: vehicle_id.into(),
                old_seat_count,
                new_seat_count,
            },
        )
    }

    /// Status changed
    #[must_use]
    pub fn status_changed(
        route_id: impl Into<String>,
        vehicle_id: impl Into<String>,
        old_status: VehicleStatus,
        new_status: VehicleStatus,
    ) -> Self {
        Self::new(
            route_id,
            QueueEventBody::VehicleStatusChanged {
                vehicle_id: vehicle_id.into(),
                old_status,
                new_status,
            },
        )
    }

    /// Full snapshot
    #[must_use]
    pub fn synced(route_id: impl Into<String>, vehicles: Vec<QueueVehicle>) -> Self {
        Self::new(route_id, QueueEventBody::QueueSynced { vehicles })
    }

    /// Error signal
    #[must_use]
    pub fn error(route_id: impl Into<String>, error: QueueError) -> Self {
        Self::new(route_id, QueueEventBody::Error(error))
    }

    /// Kind of this event
    #[must_use]
    pub const fn event_type(&self) -> QueueEventType {
        self.body.event_type()
    }

    /// Encode back into the wire shape
    ///
    /// The `type` is always the canonical camelCase name. Errors that did not
    /// come from the server carry their `origin`, so decoding the result
    /// strictly yields an equal event.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        let mut frame = Map::new();
        frame.insert("type".into(), json!(self.event_type().wire_name()));
        frame.insert("routeId".into(), json!(self.route_id));
        if let Some(timestamp) = self.timestamp {
            frame.insert(
                "timestamp".into(),
                json!(timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            );
        }

        match &self.body {
            QueueEventBody::VehicleJoinedQueue { vehicle } => {
                frame.insert("vehicle".into(), json!(vehicle));
            },
            QueueEventBody::VehicleLeftQueue { vehicle_id } => {
                frame.insert("vehicleId".into(), json!(vehicle_id));
            },
            QueueEventBody::VehiclePositionChanged {
                vehicle_id,
                old_position,
                new_position,
            } => {
                frame.insert("vehicleId".into(), json!(vehicle_id));
                frame.insert("oldPosition".into(), json!(old_position));
                frame.insert("newPosition".into(), json!(new_position));
            },
            QueueEventBody::VehicleSeatCountChanged {
                vehicle_id,
                old_seat_count,
                new_seat_count,
            } => {
                frame.insert("vehicleId".into(), json!(vehicle_id));
                frame.insert("oldSeatCount".into(), json!(old_seat_count));
                frame.insert("newSeatCount".into(), json!(new_seat_count));
            },
            QueueEventBody::VehicleStatusChanged {
                vehicle_id,
                old_status,
                new_status,
            } => {
                frame.insert("vehicleId".into(), json!(vehicle_id));
                frame.insert("oldStatus".into(), json!(old_status.as_str()));
                frame.insert("newStatus".into(), json!(new_status.as_str()));
            },
            QueueEventBody::QueueSynced { vehicles } => {
                frame.insert("vehicles".into(), json!(vehicles));
            },
            QueueEventBody::Error(error) => {
                frame.insert("message".into(), json!(error.message));
                if let Some(code) = &error.code {
                    frame.insert("code".into(), json!(code));
                }
                if error.origin != ErrorOrigin::Server {
                    frame.insert("origin".into(), json!(error.origin));
                }
            },
        }

        Value::Object(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_normalization() {
        for raw in [
            "vehicleJoinedQueue",
            "vehicle_joined_queue",
            "VehicleJoinedQueue",
            "VEHICLE-JOINED-QUEUE",
            "vehiclejoinedqueue",
        ] {
            assert_eq!(
                QueueEventType::from_wire(raw),
                Some(QueueEventType::VehicleJoinedQueue),
                "{raw}"
            );
        }
        assert_eq!(QueueEventType::from_wire("queue_error"), Some(QueueEventType::Error));
        assert_eq!(QueueEventType::from_wire("totally_unknown"), None);
        assert_eq!(QueueEventType::from_wire(""), None);
    }

    #[test]
    fn test_wire_names_resolve_to_themselves() {
        for kind in QueueEventType::ALL {
            assert_eq!(QueueEventType::from_wire(kind.wire_name()), Some(kind));
        }
    }

    #[test]
    fn test_to_wire_shape() {
        let event = QueueEvent::seat_count_changed("route-42", "v-1", 3, -2);
        let wire = event.to_wire();
        assert_eq!(wire["type"], "vehicleSeatCountChanged");
        assert_eq!(wire["routeId"], "route-42");
        assert_eq!(wire["newSeatCount"], -2);
        assert!(wire.get("timestamp").is_none());
    }

    #[test]
    fn test_vehicle_id_accessor() {
        assert_eq!(QueueEvent::left("r", "v-9").body.vehicle_id(), Some("v-9"));
        assert_eq!(QueueEvent::synced("r", vec![]).body.vehicle_id(), None);
    }
}
