//! # Komiut Testing
//!
//! Testing utilities for reducers built on `komiut-core`.
//!
//! This crate provides:
//! - Deterministic clocks (`FixedClock`, `ManualClock`)
//! - A Given-When-Then harness for reducers (`ReducerTest`)
//! - Assertion helpers for returned effects
//! - Test log capture (`init_test_tracing`)
//!
//! ## Example
//!
//! ```ignore
//! use komiut_testing::{ReducerTest, test_clock};
//!
//! ReducerTest::new(QueueReducer::new())
//!     .with_env(QueueEnvironment::new(Arc::new(test_clock())))
//!     .given_state(QueueState::new("route-42"))
//!     .when_action(QueueAction::ClearError)
//!     .then_state(|state| assert!(state.error.is_none()))
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use komiut_core::environment::Clock;


pub use reducer_test::{ReducerTest, assertions};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use komiut_testing::mocks::FixedClock;
    /// use komiut_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to
    ///
    /// Clones share the same time, so a test can keep one handle and give
    /// another to the environment under test.
    ///
    /// ```
    /// use komiut_testing::mocks::ManualClock;
    /// use komiut_core::environment::Clock;
    ///
    /// let clock = ManualClock::starting_at(komiut_testing::test_time());
    /// let env_clock = clock.clone();
    /// clock.advance(chrono::Duration::seconds(30));
    /// assert_eq!(env_clock.now(), komiut_testing::test_time() + chrono::Duration::seconds(30));
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock frozen at `time`
        #[must_use]
        pub fn starting_at(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward (or backward, for negative durations)
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an absolute time
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }
}

/// The instant every test clock starts at: 2025-01-01 06:00:00 UTC
#[must_use]
pub fn test_time() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_735_711_200, 0).unwrap_or_default()
}

/// Create a default fixed clock for tests (see [`test_time`])
#[must_use]
pub fn test_clock() -> FixedClock {
    FixedClock::new(test_time())
}

/// Route `tracing` output through the test harness's captured stdout
///
/// Safe to call from every test; only the first call installs the subscriber.
/// Honors `RUST_LOG`, defaulting to `debug`.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock};
