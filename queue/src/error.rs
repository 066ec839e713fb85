//! Error types for queue synchronization.
//!
//! Two families live here:
//! - [`DecodeError`]: why a frame failed strict decoding. Returned by
//!   [`QueueEvent::try_decode`](crate::event::QueueEvent::try_decode); never
//!   escapes the fail-soft [`QueueEvent::decode`](crate::event::QueueEvent::decode).
//! - [`QueueError`]: an error surfaced *in state* for the presentation layer,
//!   tagged with where it came from.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Message used when an error payload carries none.
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";

/// Strict decoding failure for one wire frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The frame is not valid JSON
    #[error("Frame is not valid JSON: {0}")]
    InvalidJson(String),

    /// The frame is valid JSON but not an object
    #[error("Frame is not a JSON object")]
    NotAnObject,

    /// The `type` discriminator is absent or not a string
    #[error("Frame has no event type")]
    MissingType,

    /// The `type` discriminator names no known event
    #[error("Unknown event type: {0}")]
    UnknownType(String),

    /// A required field is absent or null
    #[error("Missing field `{field}`")]
    MissingField {
        /// Wire name of the field (dotted for nested vehicle fields)
        field: String,
    },

    /// A field is present with the wrong JSON type or an unparseable value
    #[error("Invalid field `{field}`: expected {expected}")]
    InvalidField {
        /// Wire name of the field (dotted for nested vehicle fields)
        field: String,
        /// What the field should have contained
        expected: &'static str,
    },
}

impl DecodeError {
    /// Prefix the field name with a parent path (`vehicle` → `vehicle.position`).
    #[must_use]
    pub fn within(self, parent: &str) -> Self {
        match self {
            Self::MissingField { field } => Self::MissingField {
                field: format!("{parent}.{field}"),
            },
            Self::InvalidField { field, expected } => Self::InvalidField {
                field: format!("{parent}.{field}"),
                expected,
            },
            other => other,
        }
    }
}

/// Code carried by [`QueueError::selection`]
pub const SELECTION_REFUSED_CODE: &str = "selection_refused";

/// Where a surfaced queue error originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorOrigin {
    /// The server pushed an explicit `error` event
    Server,
    /// The client could not make sense of a frame
    Decode,
    /// The transport reported a connection-level failure
    Connection,
    /// A selection request was refused before reaching the server
    Selection,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Server => "server",
            Self::Decode => "decode",
            Self::Connection => "connection",
            Self::Selection => "selection",
        })
    }
}

/// An error shown to the presentation layer through `QueueState::error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueError {
    /// Human-readable message
    pub message: String,
    /// Optional machine-readable code from the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Where the error came from
    pub origin: ErrorOrigin,
}

impl QueueError {
    /// Error pushed by the server
    #[must_use]
    pub fn server(message: impl Into<String>, code: Option<String>) -> Self {
        Self {
            message: message.into(),
            code,
            origin: ErrorOrigin::Server,
        }
    }

    /// Error produced while decoding a frame
    #[must_use]
    pub fn decode(message: impl Into<String>, code: Option<String>) -> Self {
        Self {
            message: message.into(),
            code,
            origin: ErrorOrigin::Decode,
        }
    }

    /// Connection-level failure reported by the transport
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            origin: ErrorOrigin::Connection,
        }
    }

    /// Selection request refused locally while another one is still held
    #[must_use]
    pub fn selection(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: Some(SELECTION_REFUSED_CODE.to_string()),
            origin: ErrorOrigin::Selection,
        }
    }
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} error [{code}]: {}", self.origin, self.message),
            None => write!(f, "{} error: {}", self.origin, self.message),
        }
    }
}
