//! Materialized view of one route's queue.

use crate::error::QueueError;
use crate::selection::PendingVehicleSelection;
use crate::vehicle::{QueueVehicle, VehicleStatus};
use chrono::{DateTime, Utc};
use komiut_core::version::Version;
use komiut_macros::State;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport connection status, as reported by the socket layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No socket
    #[default]
    Disconnected,
    /// Opening the socket
    Connecting,
    /// Frames are flowing
    Connected,
    /// Lost the socket, trying again
    Reconnecting,
    /// Gave up, or the socket failed outright
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        })
    }
}

/// The queue as this client currently believes it to be.
///
/// `vehicles` holds at most one entry per `vehicle_id` and is kept in
/// ascending `position` order (stable for equal positions) after every
/// reduction.
#[derive(State, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueState {
    /// Route this view follows
    pub route_id: String,
    /// Queued vehicles, ordered by position
    pub vehicles: Vec<QueueVehicle>,
    /// Transport status
    pub connection_state: ConnectionState,
    /// No snapshot has arrived yet
    pub is_loading: bool,
    /// A resync was requested and has not arrived yet
    pub is_syncing: bool,
    /// Last error to show, until cleared
    pub error: Option<QueueError>,
    /// Clock time of the last reduction
    pub last_updated: Option<DateTime<Utc>>,
    /// Vehicle the passenger picked
    pub selected_vehicle_id: Option<String>,
    /// The passenger's selection request
    pub pending_selection: Option<PendingVehicleSelection>,
    /// Bumped on every reduction
    #[version]
    pub version: Version,
}

impl QueueState {
    /// Empty, loading view of `route_id`'s queue
    #[must_use]
    pub fn new(route_id: impl Into<String>) -> Self {
        Self {
            route_id: route_id.into(),
            vehicles: Vec::new(),
            connection_state: ConnectionState::Disconnected,
            is_loading: true,
            is_syncing: false,
            error: None,
            last_updated: None,
            selected_vehicle_id: None,
            pending_selection: None,
            version: Version::INITIAL,
        }
    }

    /// Front of the queue
    #[must_use]
    pub fn first_vehicle(&self) -> Option<&QueueVehicle> {
        self.vehicles.first()
    }

    /// Vehicles currently boarding, in queue order
    pub fn boarding_vehicles(&self) -> impl Iterator<Item = &QueueVehicle> {
        self.vehicles
            .iter()
            .filter(|v| v.status == VehicleStatus::Boarding)
    }

    /// Vehicles with a free seat, in queue order
    pub fn available_vehicles(&self) -> impl Iterator<Item = &QueueVehicle> {
        self.vehicles.iter().filter(|v| v.has_available_seats())
    }

    /// Free seats across the whole queue
    #[must_use]
    pub fn total_available_seats(&self) -> u64 {
        self.vehicles
            .iter()
            .map(|v| u64::from(v.available_seats))
            .sum()
    }

    /// Look a vehicle up by its id
    #[must_use]
    pub fn get_vehicle_by_id(&self, vehicle_id: &str) -> Option<&QueueVehicle> {
        self.vehicles.iter().find(|v| v.vehicle_id == vehicle_id)
    }

    /// 1-based rank of a vehicle, as reported by the server
    #[must_use]
    pub fn position_of(&self, vehicle_id: &str) -> Option<u32> {
        self.get_vehicle_by_id(vehicle_id).map(|v| v.position)
    }

    /// Number of queued vehicles
    #[must_use]
    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    /// No vehicle queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    /// An error is waiting to be shown
    #[must_use]
    pub const fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Frames are flowing
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection_state == ConnectionState::Connected
    }

    /// The picked vehicle, if still queued
    #[must_use]
    pub fn selected_vehicle(&self) -> Option<&QueueVehicle> {
        self.selected_vehicle_id
            .as_deref()
            .and_then(|id| self.get_vehicle_by_id(id))
    }

    /// A selection is awaiting the server
    #[must_use]
    pub fn has_pending_selection(&self) -> bool {
        self.pending_selection
            .as_ref()
            .is_some_and(PendingVehicleSelection::is_pending)
    }

    /// The passenger holds a selection a new request must not clobber: one
    /// awaiting the server, a confirmed one, or a confirmed vehicle kept after
    /// the selection record was cleared
    #[must_use]
    pub fn has_active_selection(&self) -> bool {
        match &self.pending_selection {
            Some(selection) => !selection.has_failed(),
            None => self.selected_vehicle_id.is_some(),
        }
    }

    /// Restore position order; stable, so equal positions keep arrival order
    pub(crate) fn sort_vehicles(&mut self) {
        self.vehicles.sort_by_key(|v| v.position);
    }

    /// Replace the entry for `vehicle_id` using `update`; unknown ids are ignored
    pub(crate) fn update_vehicle<F>(&mut self, vehicle_id: &str, update: F) -> bool
    where
        F: FnOnce(QueueVehicle) -> QueueVehicle,
    {
        let Some(index) = self.vehicles.iter().position(|v| v.vehicle_id == vehicle_id) else {
            return false;
        };
        let current = self.vehicles.remove(index);
        self.vehicles.insert(index, update(current));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(vehicles: Vec<QueueVehicle>) -> QueueState {
        QueueState {
            vehicles,
            ..QueueState::new("route-42")
        }
    }

    fn vehicle(id: &str, position: u32, available: i64) -> QueueVehicle {
        QueueVehicle::new(id, "KCA 123A", "route-42", position, 14).with_available_seats(available)
    }

    #[test]
    fn test_new_state_is_loading_and_empty() {
        let state = QueueState::new("route-42");
        assert!(state.is_loading);
        assert!(state.is_empty());
        assert_eq!(state.version(), Version::INITIAL);
        assert_eq!(state.connection_state, ConnectionState::Disconnected);
        assert!(state.first_vehicle().is_none());
    }

    #[test]
    fn test_queries() {
        let state = state_with(vec![
            vehicle("v-1", 1, 3),
            vehicle("v-2", 2, 0).with_status(VehicleStatus::Boarding),
            vehicle("v-3", 3, 10).with_status(VehicleStatus::Boarding),
        ]);

        assert_eq!(state.total_available_seats(), 13);
        assert_eq!(state.first_vehicle().map(|v| v.vehicle_id.as_str()), Some("v-1"));
        assert_eq!(state.boarding_vehicles().count(), 2);
        let available: Vec<_> = state.available_vehicles().map(|v| v.vehicle_id.as_str()).collect();
        assert_eq!(available, ["v-1", "v-3"]);
        assert_eq!(state.position_of("v-3"), Some(3));
        assert_eq!(state.get_vehicle_by_id("ghost"), None);
        assert_eq!(state.vehicle_count(), 3);
    }

    #[test]
    fn test_selected_vehicle_requires_queued_vehicle() {
        let mut state = state_with(vec![vehicle("v-1", 1, 3)]);
        state.selected_vehicle_id = Some("v-1".to_string());
        assert!(state.selected_vehicle().is_some());

        state.selected_vehicle_id = Some("gone".to_string());
        assert!(state.selected_vehicle().is_none());
    }

    #[test]
    fn test_active_selection() {
        let mut state = QueueState::new("route-42");
        assert!(!state.has_active_selection());

        let pending = PendingVehicleSelection::new("v-1", 1, Utc::now(), chrono::Duration::seconds(30));
        state.pending_selection = Some(pending.clone());
        assert!(state.has_active_selection());

        state.pending_selection = Some(pending.failed("Vehicle full"));
        assert!(!state.has_active_selection());

        state.pending_selection = None;
        state.selected_vehicle_id = Some("v-1".to_string());
        assert!(state.has_active_selection());
    }

    #[test]
    fn test_sort_is_stable() {
        let mut state = state_with(vec![
            vehicle("b", 2, 1),
            vehicle("a", 1, 1),
            vehicle("c", 2, 1),
        ]);
        state.sort_vehicles();
        let order: Vec<_> = state.vehicles.iter().map(|v| v.vehicle_id.as_str()).collect();
        assert_eq!(order, ["a", "b", "c"]);
    }

    #[test]
    fn test_bump_version() {
        let mut state = QueueState::new("route-42");
        state.bump_version();
        state.bump_version();
        assert_eq!(state.version().value(), 2);
    }
}
