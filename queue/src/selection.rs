//! Optimistic vehicle selection.
//!
//! A passenger picks a vehicle before the server has agreed. The request is
//! recorded as a [`PendingVehicleSelection`] so the view can show it at once;
//! it is later confirmed, rejected, or times out at its deadline.

use chrono::{DateTime, Utc};
use komiut_core::version::Version;
use serde::{Deserialize, Serialize};

/// Failure reason used when a selection passes its deadline
pub const SELECTION_TIMED_OUT: &str = "Selection timed out";

/// Failure reason used when the selected vehicle leaves the queue
pub const VEHICLE_LEFT_QUEUE: &str = "Vehicle left the queue";

/// Resolution of a selection request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SelectionStatus {
    /// Awaiting the server
    Pending,
    /// The server accepted the selection
    Confirmed,
    /// The selection did not go through
    Failed {
        /// Why
        reason: String,
    },
}

/// An in-flight (or resolved) selection request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingVehicleSelection {
    /// Vehicle the passenger picked
    pub vehicle_id: String,
    /// Seats asked for
    pub seats_requested: u32,
    /// When the request was made
    pub timestamp: DateTime<Utc>,
    /// When the request stops waiting for the server
    pub deadline: DateTime<Utc>,
    /// Where the request stands
    pub status: SelectionStatus,
    /// State version produced by the request, identifying it to its timer
    #[serde(default)]
    pub request: Version,
}

impl PendingVehicleSelection {
    /// Record a pending request made at `timestamp`, expiring after `timeout`.
    #[must_use]
    pub fn new(
        vehicle_id: impl Into<String>,
        seats_requested: u32,
        timestamp: DateTime<Utc>,
        timeout: chrono::Duration,
    ) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            seats_requested,
            timestamp,
            deadline: timestamp + timeout,
            status: SelectionStatus::Pending,
            request: Version::INITIAL,
        }
    }

    /// Tag the request with the state version it produced
    #[must_use]
    pub const fn for_request(mut self, request: Version) -> Self {
        self.request = request;
        self
    }

    /// Record a request that failed before it was ever sent.
    #[must_use]
    pub fn rejected(
        vehicle_id: impl Into<String>,
        seats_requested: u32,
        timestamp: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            seats_requested,
            timestamp,
            deadline: timestamp,
            status: SelectionStatus::Failed {
                reason: reason.into(),
            },
            request: Version::INITIAL,
        }
    }

    /// The server accepted. No-op once resolved.
    #[must_use]
    pub fn confirmed(mut self) -> Self {
        if self.is_pending() {
            self.status = SelectionStatus::Confirmed;
        }
        self
    }

    /// The request failed. No-op once resolved.
    #[must_use]
    pub fn failed(mut self, reason: impl Into<String>) -> Self {
        if self.is_pending() {
            self.status = SelectionStatus::Failed {
                reason: reason.into(),
            };
        }
        self
    }

    /// The deadline passed without an answer. No-op once resolved.
    #[must_use]
    pub fn timed_out(self) -> Self {
        self.failed(SELECTION_TIMED_OUT)
    }

    /// Still waiting
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self.status, SelectionStatus::Pending)
    }

    /// Accepted by the server
    #[must_use]
    pub const fn is_confirmed(&self) -> bool {
        matches!(self.status, SelectionStatus::Confirmed)
    }

    /// Did not go through
    #[must_use]
    pub const fn has_failed(&self) -> bool {
        matches!(self.status, SelectionStatus::Failed { .. })
    }

    /// Why it did not go through
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        match &self.status {
            SelectionStatus::Failed { reason } => Some(reason),
            _ => None,
        }
    }

    /// Pending and past its deadline at `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && now >= self.deadline
    }
}
