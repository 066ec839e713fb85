//! Queue reducer.
//!
//! [`reduce_event`] folds one decoded [`QueueEvent`] into a [`QueueState`]
//! without touching the input. [`QueueReducer`] wraps it for the store, adding
//! connection tracking, resync requests and the optimistic selection flow.

use crate::config::QueueConfig;
use crate::error::{ErrorOrigin, QueueError};
use crate::event::{QueueEvent, QueueEventBody};
use crate::selection::{PendingVehicleSelection, VEHICLE_LEFT_QUEUE};
use crate::state::{ConnectionState, QueueState};
use crate::vehicle::QueueVehicle;
use chrono::{DateTime, Utc};
use komiut_core::{
    SmallVec, delay, effect::Effect, environment::Clock, environment::SystemClock,
    reducer::Reducer, smallvec, version::Version,
};
use komiut_macros::Action;
use metrics::counter;
use std::collections::HashSet;
use std::sync::Arc;

/// Actions reduced, labelled by action name
pub const ACTIONS_REDUCED: &str = "queue_actions_reduced_total";

/// Message used when the transport fails without saying why
pub const CONNECTION_ERROR_MESSAGE: &str = "Connection error";

// ============================================================================
// Actions (Commands + Events)
// ============================================================================

/// Everything a queue session reacts to.
#[derive(Action, Clone, Debug, PartialEq, Eq)]
pub enum QueueAction {
    // Events
    /// A decoded frame from the queue socket
    #[event]
    EventReceived(QueueEvent),

    /// A raw text frame, decoded during reduction
    #[event]
    FrameReceived {
        /// Frame text
        raw: String,
    },

    /// The transport's connection status changed
    #[event]
    ConnectionChanged {
        /// New status
        state: ConnectionState,
        /// Why, when the transport said
        reason: Option<String>,
    },

    /// The server accepted the passenger's selection
    #[event]
    SelectionConfirmed {
        /// Vehicle the answer is about
        vehicle_id: String,
    },

    /// The server refused the passenger's selection
    #[event]
    SelectionRejected {
        /// Vehicle the answer is about
        vehicle_id: String,
        /// Why
        reason: String,
    },

    /// A selection's deadline passed
    #[event]
    SelectionTimedOut {
        /// Vehicle of the selection
        vehicle_id: String,
        /// State version the request produced, to ignore timers of replaced requests
        request: Version,
    },

    // Commands
    /// The client asked the server for a fresh snapshot
    #[command]
    SyncRequested,

    /// The passenger picked a vehicle
    #[command]
    SelectVehicle {
        /// Vehicle picked
        vehicle_id: String,
        /// Seats wanted
        seats_requested: u32,
    },

    /// Dismiss the current error
    #[command]
    ClearError,

    /// Forget the current selection
    #[command]
    ClearSelection,
}

impl From<QueueEvent> for QueueAction {
    fn from(event: QueueEvent) -> Self {
        Self::EventReceived(event)
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Dependencies of the queue reducer
#[derive(Clone)]
pub struct QueueEnvironment {
    /// Clock for `last_updated` and selection deadlines
    pub clock: Arc<dyn Clock>,
    /// Session tunables
    pub config: QueueConfig,
}

impl QueueEnvironment {
    /// Creates a new `QueueEnvironment` with default configuration
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            config: QueueConfig::default(),
        }
    }

    /// Replace the configuration
    #[must_use]
    pub fn with_config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }
}

impl Default for QueueEnvironment {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl std::fmt::Debug for QueueEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueEnvironment")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Pure event application
// ============================================================================

/// Fold `event` into a copy of `previous`, stamped with `now`.
///
/// `previous` is left as it was; equal inputs give equal outputs.
#[must_use]
pub fn reduce_event(previous: &QueueState, event: QueueEvent, now: DateTime<Utc>) -> QueueState {
    let mut next = previous.clone();
    apply_event(&mut next, event, now);
    next
}

impl QueueState {
    /// This state with `event` applied at `now`. See [`reduce_event`].
    #[must_use]
    pub fn apply(&self, event: QueueEvent, now: DateTime<Utc>) -> Self {
        reduce_event(self, event, now)
    }
}

/// Apply `event` in place.
fn apply_event(state: &mut QueueState, event: QueueEvent, now: DateTime<Utc>) {
    let foreign = !state.route_id.is_empty()
        && !event.route_id.is_empty()
        && state.route_id != event.route_id;

    if foreign {
        tracing::warn!(
            route_id = %state.route_id,
            event_route_id = %event.route_id,
            event_type = %event.event_type(),
            "Ignoring event for another route"
        );
    } else {
        apply_body(state, event.body);
    }

    touch(state, now);
}

fn apply_body(state: &mut QueueState, body: QueueEventBody) {
    match body {
        QueueEventBody::VehicleJoinedQueue { vehicle } => {
            state.vehicles.retain(|v| v.vehicle_id != vehicle.vehicle_id);
            state.vehicles.push(vehicle);
            state.sort_vehicles();
        },

        QueueEventBody::VehicleLeftQueue { vehicle_id } => {
            let before = state.vehicles.len();
            state.vehicles.retain(|v| v.vehicle_id != vehicle_id);
            if state.vehicles.len() != before {
                fail_selection_for_missing_vehicles(state);
            } else {
                tracing::debug!(%vehicle_id, "Departure of unknown vehicle ignored");
            }
        },

        QueueEventBody::VehiclePositionChanged {
            vehicle_id,
            new_position,
            ..
        } => {
            if state.update_vehicle(&vehicle_id, |v| v.with_position(new_position)) {
                state.sort_vehicles();
            } else {
                tracing::debug!(%vehicle_id, "Position change for unknown vehicle ignored");
            }
        },

        QueueEventBody::VehicleSeatCountChanged {
            vehicle_id,
            new_seat_count,
            ..
        } => {
            if !state.update_vehicle(&vehicle_id, |v| v.with_available_seats(new_seat_count)) {
                tracing::debug!(%vehicle_id, "Seat change for unknown vehicle ignored");
            }
        },

        QueueEventBody::VehicleStatusChanged {
            vehicle_id,
            new_status,
            ..
        } => {
            if !state.update_vehicle(&vehicle_id, |v| v.with_status(new_status)) {
                tracing::debug!(%vehicle_id, "Status change for unknown vehicle ignored");
            }
        },

        QueueEventBody::QueueSynced { vehicles } => {
            state.vehicles = dedupe_keep_last(vehicles);
            state.sort_vehicles();
            state.is_loading = false;
            state.is_syncing = false;
            fail_selection_for_missing_vehicles(state);
        },

        QueueEventBody::Error(error) => {
            tracing::warn!(%error, "Queue error received");
            state.error = Some(error);
        },
    }
}

/// One entry per vehicle id; a later occurrence wins and keeps its place
fn dedupe_keep_last(vehicles: Vec<QueueVehicle>) -> Vec<QueueVehicle> {
    let mut seen = HashSet::with_capacity(vehicles.len());
    let mut kept: Vec<QueueVehicle> = vehicles
        .into_iter()
        .rev()
        .filter(|v| seen.insert(v.vehicle_id.clone()))
        .collect();
    kept.reverse();
    kept
}

/// A pending selection whose vehicle is no longer queued cannot succeed
fn fail_selection_for_missing_vehicles(state: &mut QueueState) {
    let Some(selection) = state.pending_selection.take() else {
        return;
    };

    let gone = selection.is_pending() && state.get_vehicle_by_id(&selection.vehicle_id).is_none();
    state.pending_selection = Some(if gone {
        tracing::info!(vehicle_id = %selection.vehicle_id, "Selected vehicle left the queue");
        selection.failed(VEHICLE_LEFT_QUEUE)
    } else {
        selection
    });
}

fn touch(state: &mut QueueState, now: DateTime<Utc>) {
    state.last_updated = Some(now);
    state.bump_version();
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for one route's queue view
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueReducer;

impl QueueReducer {
    /// Creates a new `QueueReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Why a selection request cannot go through, if it cannot
    fn validate_selection(
        state: &QueueState,
        config: &QueueConfig,
        vehicle_id: &str,
        seats_requested: u32,
    ) -> Result<(), String> {
        if seats_requested == 0 {
            return Err("Seat count must be greater than zero".to_string());
        }

        if seats_requested > config.max_seats_per_selection {
            return Err(format!(
                "Cannot select more than {} seats at once (requested: {seats_requested})",
                config.max_seats_per_selection
            ));
        }

        let Some(vehicle) = state.get_vehicle_by_id(vehicle_id) else {
            return Err(format!("Vehicle {vehicle_id} is not in the queue"));
        };

        if vehicle.is_departed() {
            return Err(format!("Vehicle {vehicle_id} has departed"));
        }

        if vehicle.available_seats < seats_requested {
            return Err(format!(
                "Not enough seats: requested {seats_requested}, available {}",
                vehicle.available_seats
            ));
        }

        Ok(())
    }

    /// Record a request that failed validation.
    ///
    /// An active selection stays as it is and the refusal surfaces as an
    /// error. Otherwise the refusal becomes the selection record, and the
    /// vehicle of an earlier failed request is no longer selected.
    fn refuse_selection(
        state: &mut QueueState,
        vehicle_id: String,
        seats_requested: u32,
        now: DateTime<Utc>,
        reason: String,
    ) {
        tracing::info!(%vehicle_id, seats_requested, %reason, "Selection refused");

        if state.has_active_selection() {
            state.error = Some(QueueError::selection(reason));
            return;
        }

        state.selected_vehicle_id = None;
        state.pending_selection = Some(PendingVehicleSelection::rejected(
            vehicle_id,
            seats_requested,
            now,
            reason,
        ));
    }

    /// Resolve the pending selection for `vehicle_id` with `resolve`
    fn resolve_selection<F>(state: &mut QueueState, vehicle_id: &str, resolve: F)
    where
        F: FnOnce(PendingVehicleSelection) -> PendingVehicleSelection,
    {
        match state.pending_selection.take() {
            Some(selection) if selection.vehicle_id == vehicle_id && selection.is_pending() => {
                state.pending_selection = Some(resolve(selection));
            },
            other => {
                tracing::debug!(%vehicle_id, "Selection answer does not match a pending request");
                state.pending_selection = other;
            },
        }
    }

    fn connection_changed(state: &mut QueueState, connection: ConnectionState, reason: Option<String>) {
        tracing::info!(from = %state.connection_state, to = %connection, "Connection state changed");
        state.connection_state = connection;

        match connection {
            ConnectionState::Error => {
                let message = reason.unwrap_or_else(|| CONNECTION_ERROR_MESSAGE.to_string());
                state.error = Some(QueueError::connection(message));
            },
            ConnectionState::Connected => {
                if state
                    .error
                    .as_ref()
                    .is_some_and(|e| e.origin == ErrorOrigin::Connection)
                {
                    state.error = None;
                }
            },
            ConnectionState::Disconnected
            | ConnectionState::Connecting
            | ConnectionState::Reconnecting => {},
        }
    }
}

impl Reducer for QueueReducer {
    type State = QueueState;
    type Action = QueueAction;
    type Environment = QueueEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let action_name = action.action_name();
        counter!(ACTIONS_REDUCED, "action" => action_name).increment(1);
        let now = env.clock.now();

        let effects = match action {
            // ========== Events ==========
            QueueAction::EventReceived(event) => {
                apply_event(state, event, now);
                smallvec![Effect::None]
            },

            QueueAction::FrameReceived { raw } => {
                apply_event(state, QueueEvent::decode_str(&raw), now);
                smallvec![Effect::None]
            },

            QueueAction::ConnectionChanged {
                state: connection,
                reason,
            } => {
                Self::connection_changed(state, connection, reason);
                touch(state, now);
                smallvec![Effect::None]
            },

            QueueAction::SelectionConfirmed { vehicle_id } => {
                Self::resolve_selection(state, &vehicle_id, PendingVehicleSelection::confirmed);
                touch(state, now);
                smallvec![Effect::None]
            },

            QueueAction::SelectionRejected { vehicle_id, reason } => {
                Self::resolve_selection(state, &vehicle_id, |s| s.failed(reason));
                touch(state, now);
                smallvec![Effect::None]
            },

            QueueAction::SelectionTimedOut {
                vehicle_id,
                request,
            } => {
                let current = state
                    .pending_selection
                    .as_ref()
                    .is_some_and(|s| s.request == request);
                if current {
                    Self::resolve_selection(state, &vehicle_id, PendingVehicleSelection::timed_out);
                } else {
                    tracing::debug!(%vehicle_id, "Stale selection timeout ignored");
                }
                touch(state, now);
                smallvec![Effect::None]
            },

            // ========== Commands ==========
            QueueAction::SyncRequested => {
                state.is_syncing = true;
                touch(state, now);
                smallvec![Effect::None]
            },

            QueueAction::SelectVehicle {
                vehicle_id,
                seats_requested,
            } => {
                if let Err(reason) =
                    Self::validate_selection(state, &env.config, &vehicle_id, seats_requested)
                {
                    Self::refuse_selection(state, vehicle_id, seats_requested, now, reason);
                    touch(state, now);
                    return smallvec![Effect::None];
                }

                tracing::info!(%vehicle_id, seats_requested, "Vehicle selected");
                let request = state.version().next();
                state.selected_vehicle_id = Some(vehicle_id.clone());
                state.pending_selection = Some(
                    PendingVehicleSelection::new(
                        vehicle_id.clone(),
                        seats_requested,
                        now,
                        env.config.selection_deadline_offset(),
                    )
                    .for_request(request),
                );
                touch(state, now);

                smallvec![delay! {
                    duration: env.config.selection_timeout,
                    action: QueueAction::SelectionTimedOut { vehicle_id, request }
                }]
            },

            QueueAction::ClearError => {
                state.error = None;
                touch(state, now);
                smallvec![Effect::None]
            },

            QueueAction::ClearSelection => {
                let confirmed = state
                    .pending_selection
                    .take()
                    .is_some_and(|s| s.is_confirmed());
                if !confirmed {
                    state.selected_vehicle_id = None;
                }
                touch(state, now);
                smallvec![Effect::None]
            },
        };

        tracing::debug!(
            action = action_name,
            version = %state.version(),
            vehicles = state.vehicles.len(),
            "Reduced queue action"
        );

        effects
    }
}
