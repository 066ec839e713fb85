//! Queue session configuration.
//!
//! Loaded from environment variables with defaults:
//!
//! | Variable | Default |
//! |---|---|
//! | `QUEUE_SELECTION_TIMEOUT_SECS` | 30 |
//! | `QUEUE_MAX_SEATS_PER_SELECTION` | 8 |
//! | `QUEUE_BROADCAST_CAPACITY` | 64 |
//! | `QUEUE_SHUTDOWN_TIMEOUT_SECS` | 5 |

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but does not parse
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue {
        /// Variable name
        var: &'static str,
        /// Raw value found
        value: String,
    },

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// Tunables for a queue session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// How long a selection waits for the server before failing
    pub selection_timeout: Duration,
    /// Most seats one selection may ask for
    pub max_seats_per_selection: u32,
    /// Capacity of the store's action broadcast channel
    pub broadcast_capacity: usize,
    /// How long shutdown waits for running effects
    pub shutdown_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            selection_timeout: Duration::from_secs(30),
            max_seats_per_selection: 8,
            broadcast_capacity: 64,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl QueueConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to something unparseable
    /// or the resulting configuration does not validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults for
    /// variables it does not know.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            selection_timeout: Duration::from_secs(parse_var(
                &lookup,
                "QUEUE_SELECTION_TIMEOUT_SECS",
                defaults.selection_timeout.as_secs(),
            )?),
            max_seats_per_selection: parse_var(
                &lookup,
                "QUEUE_MAX_SEATS_PER_SELECTION",
                defaults.max_seats_per_selection,
            )?,
            broadcast_capacity: parse_var(
                &lookup,
                "QUEUE_BROADCAST_CAPACITY",
                defaults.broadcast_capacity,
            )?,
            shutdown_timeout: Duration::from_secs(parse_var(
                &lookup,
                "QUEUE_SHUTDOWN_TIMEOUT_SECS",
                defaults.shutdown_timeout.as_secs(),
            )?),
        };

        config.validate()?;
        Ok(config)
    }

    /// Set the selection timeout
    #[must_use]
    pub const fn with_selection_timeout(mut self, timeout: Duration) -> Self {
        self.selection_timeout = timeout;
        self
    }

    /// Set the per-selection seat limit
    #[must_use]
    pub const fn with_max_seats_per_selection(mut self, seats: u32) -> Self {
        self.max_seats_per_selection = seats;
        self
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if any value is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.selection_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "selection_timeout must be positive".to_string(),
            ));
        }
        if self.max_seats_per_selection == 0 {
            return Err(ConfigError::Validation(
                "max_seats_per_selection must be positive".to_string(),
            ));
        }
        if self.broadcast_capacity == 0 {
            return Err(ConfigError::Validation(
                "broadcast_capacity must be positive".to_string(),
            ));
        }
        if self.shutdown_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "shutdown_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Selection timeout as a calendar duration, for deadlines
    #[must_use]
    pub fn selection_deadline_offset(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.selection_timeout).unwrap_or(chrono::Duration::MAX)
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = QueueConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, QueueConfig::default());
        assert_eq!(config.selection_timeout, Duration::from_secs(30));
        assert_eq!(config.max_seats_per_selection, 8);
        assert_eq!(config.broadcast_capacity, 64);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_overrides() {
        let config = QueueConfig::from_lookup(lookup(&[
            ("QUEUE_SELECTION_TIMEOUT_SECS", "10"),
            ("QUEUE_MAX_SEATS_PER_SELECTION", " 4 "),
        ]))
        .unwrap();
        assert_eq!(config.selection_timeout, Duration::from_secs(10));
        assert_eq!(config.max_seats_per_selection, 4);
        assert_eq!(config.selection_deadline_offset(), chrono::Duration::seconds(10));
    }

    #[test]
    fn test_unparseable_value() {
        let err = QueueConfig::from_lookup(lookup(&[("QUEUE_BROADCAST_CAPACITY", "lots")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                var: "QUEUE_BROADCAST_CAPACITY",
                value: "lots".to_string()
            }
        );
    }

    #[test]
    fn test_zero_rejected() {
        let err = QueueConfig::from_lookup(lookup(&[("QUEUE_MAX_SEATS_PER_SELECTION", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(QueueConfig::default().with_selection_timeout(Duration::ZERO).validate().is_err());
    }
}
