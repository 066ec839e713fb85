//! # Komiut Core
//!
//! Core traits and types for Komiut queue synchronization.
//!
//! Queue views are built with the Reducer pattern: every input (a frame pushed
//! by the server, a connection change, a user command) is an action folded into
//! owned state by a pure reducer. Side effects such as timeouts are returned as
//! descriptions and executed by the runtime.
//!
//! ## Core Concepts
//!
//! - **State**: Domain state for a feature (e.g. one route's queue)
//! - **Action**: All possible inputs to a reducer (commands and events)
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions (not execution)
//! - **Environment**: Injected dependencies via traits
//!
//! ## Example
//!
//! ```ignore
//! use komiut_core::*;
//!
//! impl Reducer for QueueReducer {
//!     type State = QueueState;
//!     type Action = QueueAction;
//!     type Environment = QueueEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut QueueState,
//!         action: QueueAction,
//!         env: &QueueEnvironment,
//!     ) -> SmallVec<[Effect<QueueAction>; 4]> {
//!         smallvec![Effect::None]
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

mod effect_macros;

/// Monotonic snapshot versions
pub mod version;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// They contain all business logic and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for QueueReducer {
    ///     type State = QueueState;
    ///     type Action = QueueAction;
    ///     type Environment = QueueEnvironment;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut QueueState,
    ///         action: QueueAction,
    ///         env: &QueueEnvironment,
    ///     ) -> SmallVec<[Effect<QueueAction>; 4]> {
    ///         match action {
    ///             QueueAction::ClearError => {
    ///                 state.error = None;
    ///                 smallvec![Effect::None]
    ///             }
    ///             _ => smallvec![Effect::None],
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        ///
        /// Reducers must not panic and must not perform I/O.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values (not execution) and are composable.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers and executed by the Store runtime.
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Run effects sequentially
        Sequential(Vec<Effect<Action>>),

        /// Delayed action (for timeouts)
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after delay
            action: Box<Action>,
        },

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Returns true if this effect does nothing when executed
        ///
        /// Empty `Parallel`/`Sequential` groups and groups of no-ops count as no-ops.
        #[must_use]
        pub fn is_none(&self) -> bool {
            match self {
                Effect::None => true,
                Effect::Parallel(effects) | Effect::Sequential(effects) => {
                    effects.iter().all(Effect::is_none)
                },
                Effect::Delay { .. } | Effect::Future(_) => false,
            }
        }

        /// Short name of the variant, used as a metrics label
        #[must_use]
        pub const fn kind(&self) -> &'static str {
            match self {
                Effect::None => "none",
                Effect::Parallel(_) => "parallel",
                Effect::Sequential(_) => "sequential",
                Effect::Delay { .. } => "delay",
                Effect::Future(_) => "future",
            }
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time from the operating system
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::effect::Effect;
    use super::environment::{Clock, SystemClock};
    use std::time::Duration;

    #[derive(Debug, Clone)]
    enum TestAction {
        Ping,
    }

    #[test]
    fn test_nested_noops_are_none() {
        let effect: Effect<TestAction> =
            Effect::merge(vec![Effect::None, Effect::chain(vec![Effect::None])]);
        assert!(effect.is_none());
        assert_eq!(effect.kind(), "parallel");
    }

    #[test]
    fn test_delay_is_not_none() {
        let effect = Effect::Delay {
            duration: Duration::from_millis(5),
            action: Box::new(TestAction::Ping),
        };
        assert!(!effect.is_none());
        assert_eq!(effect.kind(), "delay");
        assert!(format!("{effect:?}").contains("Ping"));
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
