//! Vehicles waiting at a stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a vehicle is in its stage lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleStatus {
    /// Queued, not yet loading passengers
    #[default]
    Waiting,
    /// Loading passengers
    Boarding,
    /// Pulling out of the stage
    Departing,
    /// Gone
    Departed,
}

impl VehicleStatus {
    /// All statuses, in lifecycle order
    pub const ALL: [Self; 4] = [Self::Waiting, Self::Boarding, Self::Departing, Self::Departed];

    /// Wire name of the status
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Boarding => "boarding",
            Self::Departing => "departing",
            Self::Departed => "departed",
        }
    }
}

impl fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status string that names no known status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown vehicle status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for VehicleStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "waiting" => Ok(Self::Waiting),
            "boarding" => Ok(Self::Boarding),
            "departing" => Ok(Self::Departing),
            "departed" => Ok(Self::Departed),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// One vehicle queued for a route.
///
/// Values are immutable in spirit: every change produces a new vehicle through
/// the `with_*` builders, and the reducer swaps it into the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueVehicle {
    /// Queue entry id
    pub id: String,
    /// Vehicle id, unique within a route's queue
    pub vehicle_id: String,
    /// Number plate
    pub registration_number: String,
    /// Route this vehicle is queued for
    pub route_id: String,
    /// 1-based rank in the queue
    pub position: u32,
    /// Lifecycle status
    pub status: VehicleStatus,
    /// Seat capacity
    pub total_seats: u32,
    /// Seats still free, never above `total_seats`
    pub available_seats: u32,
    /// Driver, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_name: Option<String>,
    /// Expected departure, when announced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_departure_time: Option<DateTime<Utc>>,
}

impl QueueVehicle {
    /// Create a waiting vehicle with every seat free.
    #[must_use]
    pub fn new(
        vehicle_id: impl Into<String>,
        registration_number: impl Into<String>,
        route_id: impl Into<String>,
        position: u32,
        total_seats: u32,
    ) -> Self {
        let vehicle_id = vehicle_id.into();
        Self {
            id: format!("entry-{vehicle_id}"),
            vehicle_id,
            registration_number: registration_number.into(),
            route_id: route_id.into(),
            position,
            status: VehicleStatus::Waiting,
            total_seats,
            available_seats: total_seats,
            driver_name: None,
            estimated_departure_time: None,
        }
    }

    /// No seat left
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.available_seats == 0
    }

    /// At least one seat left
    #[must_use]
    pub const fn has_available_seats(&self) -> bool {
        self.available_seats > 0
    }

    /// Seats taken
    #[must_use]
    pub const fn occupied_seats(&self) -> u32 {
        self.total_seats.saturating_sub(self.available_seats)
    }

    /// Share of seats taken, 0–100. A vehicle without seats reports 0.
    #[must_use]
    pub fn occupancy_percentage(&self) -> f64 {
        if self.total_seats == 0 {
            return 0.0;
        }
        f64::from(self.occupied_seats()) * 100.0 / f64::from(self.total_seats)
    }

    /// Has left the stage
    #[must_use]
    pub fn is_departed(&self) -> bool {
        self.status == VehicleStatus::Departed
    }

    /// Same vehicle at another rank
    #[must_use]
    pub fn with_position(mut self, position: u32) -> Self {
        self.position = position;
        self
    }

    /// Same vehicle with `seats` free, clamped into `0..=total_seats`
    #[must_use]
    pub fn with_available_seats(mut self, seats: i64) -> Self {
        self.available_seats = clamp_seats(seats, self.total_seats);
        self
    }

    /// Same vehicle in another lifecycle status
    #[must_use]
    pub fn with_status(mut self, status: VehicleStatus) -> Self {
        self.status = status;
        self
    }

    /// Same vehicle with a driver
    #[must_use]
    pub fn with_driver(mut self, driver_name: impl Into<String>) -> Self {
        self.driver_name = Some(driver_name.into());
        self
    }

    /// Same vehicle with an announced departure
    #[must_use]
    pub const fn with_estimated_departure(mut self, at: DateTime<Utc>) -> Self {
        self.estimated_departure_time = Some(at);
        self
    }
}

/// Clamp a reported seat count into `0..=total`.
#[must_use]
pub fn clamp_seats(seats: i64, total: u32) -> u32 {
    u32::try_from(seats.clamp(0, i64::from(total))).unwrap_or(total)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;

    fn matatu() -> QueueVehicle {
        QueueVehicle::new("v-1", "KCA 123A", "route-42", 1, 14)
    }

    #[test]
    fn test_new_vehicle_is_empty_and_waiting() {
        let vehicle = matatu();
        assert_eq!(vehicle.status, VehicleStatus::Waiting);
        assert_eq!(vehicle.available_seats, 14);
        assert_eq!(vehicle.occupied_seats(), 0);
        assert!(vehicle.has_available_seats());
        assert!(!vehicle.is_full());
    }

    #[test]
    fn test_seat_clamp() {
        assert_eq!(matatu().with_available_seats(20).available_seats, 14);
        assert_eq!(matatu().with_available_seats(-3).available_seats, 0);
        assert_eq!(matatu().with_available_seats(9).available_seats, 9);
        assert_eq!(clamp_seats(i64::MAX, 0), 0);
    }

    #[test]
    fn test_occupancy() {
        let vehicle = matatu().with_available_seats(7);
        assert!((vehicle.occupancy_percentage() - 50.0).abs() < f64::EPSILON);

        let seatless = QueueVehicle::new("v-2", "KCB 001B", "route-42", 2, 0);
        assert!(seatless.occupancy_percentage().abs() < f64::EPSILON);
        assert!(seatless.is_full());
    }

    #[test]
    fn test_status_parse_and_display() {
        for status in VehicleStatus::ALL {
            assert_eq!(status.as_str().parse::<VehicleStatus>(), Ok(status));
        }
        assert_eq!(" Boarding ".parse::<VehicleStatus>(), Ok(VehicleStatus::Boarding));
        assert!("parked".parse::<VehicleStatus>().is_err());
        assert!(matatu().with_status(VehicleStatus::Departed).is_departed());
    }

    #[test]
    fn test_serializes_wire_shape() {
        let json = serde_json::to_value(matatu().with_driver("Otieno")).unwrap();
        assert_eq!(json["vehicleId"], "v-1");
        assert_eq!(json["registrationNumber"], "KCA 123A");
        assert_eq!(json["availableSeats"], 14);
        assert_eq!(json["status"], "waiting");
        assert_eq!(json["driverName"], "Otieno");
        assert!(json.get("estimatedDepartureTime").is_none());
    }
}
