//! # Komiut Runtime
//!
//! The Store runtime that coordinates reducer execution and effect handling.
//!
//! ## Core Components
//!
//! - **Store**: Owns state, serializes actions through the reducer, executes effects
//! - **Snapshots**: After every reduction an immutable `Arc<State>` is published on a
//!   watch channel, so readers never block writers and older snapshots stay valid
//! - **Feedback loop**: Actions produced by `Delay`/`Future` effects are sent back
//!   into the same store
//!
//! ## Example
//!
//! ```ignore
//! use komiut_runtime::Store;
//!
//! let store = Store::new(QueueState::new("route-42"), QueueReducer::new(), env);
//!
//! store.send(QueueAction::FrameReceived { raw }).await?;
//!
//! let seats = store.state(|s| s.total_available_seats()).await;
//! let mut snapshots = store.subscribe();
//! ```

use komiut_core::{effect::Effect, reducer::Reducer};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, broadcast, watch};

/// Prometheus metrics for observability
pub mod metrics;

use crate::metrics::StoreMetrics;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// This error is returned when `send()` is called after shutdown initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        ///
        /// Some effects were still running when the timeout elapsed.
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),
    }
}

pub use error::StoreError;
pub use store::Store;

/// Configuration for a [`Store`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Capacity of the broadcast channel carrying effect-produced actions
    pub broadcast_capacity: usize,
    /// How often `shutdown` re-checks the number of running effects
    pub shutdown_poll_interval: Duration,
}

impl StoreConfig {
    /// Set the action broadcast capacity (minimum 1)
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = if capacity == 0 { 1 } else { capacity };
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 16,
            shutdown_poll_interval: Duration::from_millis(10),
        }
    }
}

/// Decrements the running-effect counter when dropped, even if the effect panics.
struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

type BoxedRun = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Store runtime for coordinating reducer execution and effect handling.
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicUsize, BoxedRun, Effect, Ordering, PendingGuard, Reducer, RwLock,
        StoreConfig, StoreError, StoreMetrics, broadcast, watch,
    };
    use std::time::{Duration, Instant};

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock`; writes are serialized, one action at a time)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    /// 5. Snapshot publication (`watch` channel of `Arc<S>`)
    ///
    /// Cloning a Store is cheap and yields a handle to the same state.
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: Arc<R>,
        environment: Arc<E>,
        snapshots: Arc<watch::Sender<Arc<S>>>,
        /// Actions produced by effects, for observers
        action_broadcast: broadcast::Sender<A>,
        shutdown: Arc<AtomicBool>,
        shutdown_signal: Arc<watch::Sender<bool>>,
        pending_effects: Arc<AtomicUsize>,
        config: StoreConfig,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Clone + Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_config(initial_state, reducer, environment, StoreConfig::default())
        }

        /// Create a new Store with custom configuration
        #[must_use]
        pub fn with_config(initial_state: S, reducer: R, environment: E, config: StoreConfig) -> Self {
            let (action_broadcast, _) = broadcast::channel(config.broadcast_capacity.max(1));
            let (snapshots, _) = watch::channel(Arc::new(initial_state.clone()));
            let (shutdown_signal, _) = watch::channel(false);

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer: Arc::new(reducer),
                environment: Arc::new(environment),
                snapshots: Arc::new(snapshots),
                action_broadcast,
                shutdown: Arc::new(AtomicBool::new(false)),
                shutdown_signal: Arc::new(shutdown_signal),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                config,
            }
        }

        /// Send an action to the store
        ///
        /// The reducer runs under the state's write lock, so concurrent senders
        /// are folded one at a time in lock-acquisition order. The new snapshot
        /// is published before the lock is released; the returned snapshot is
        /// the state right after this action.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<Arc<S>, StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                StoreMetrics::record_rejected();
                return Err(StoreError::ShutdownInProgress);
            }

            let (snapshot, effects) = {
                let mut state = self.state.write().await;

                let start = Instant::now();
                let effects = self.reducer.reduce(&mut *state, action, &self.environment);
                StoreMetrics::record_action(start.elapsed());

                let snapshot = Arc::new(state.clone());
                self.snapshots.send_replace(Arc::clone(&snapshot));
                (snapshot, effects)
            };

            tracing::trace!("Reducer returned {} effects", effects.len());
            for effect in effects {
                self.spawn_effect(effect);
            }

            Ok(snapshot)
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let count = store.state(|s| s.vehicles.len()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Latest published snapshot, without touching the state lock
        #[must_use]
        pub fn snapshot(&self) -> Arc<S> {
            self.snapshots.borrow().clone()
        }

        /// Subscribe to snapshots published after every reduction
        ///
        /// The receiver always holds the latest snapshot; intermediate ones may
        /// be skipped by slow readers.
        #[must_use]
        pub fn subscribe(&self) -> watch::Receiver<Arc<S>> {
            self.snapshots.subscribe()
        }

        /// Subscribe to actions produced by effects (not actions passed to `send`)
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Number of effects currently running
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.pending_effects.load(Ordering::SeqCst)
        }

        /// Returns true once `shutdown` has been called
        #[must_use]
        pub fn is_shutting_down(&self) -> bool {
            self.shutdown.load(Ordering::Acquire)
        }

        /// Stop accepting actions and wait for running effects to finish
        ///
        /// Pending `Delay` effects are cancelled immediately; their actions are
        /// never delivered.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] with the number of effects still
        /// running if they do not finish within `timeout`.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Store shutdown initiated");
            self.shutdown.store(true, Ordering::Release);
            self.shutdown_signal.send_replace(true);

            let deadline = Instant::now() + timeout;
            loop {
                let pending = self.pending_effects.load(Ordering::SeqCst);
                if pending == 0 {
                    tracing::info!("Store shutdown complete");
                    return Ok(());
                }
                if Instant::now() >= deadline {
                    tracing::error!(pending, "Store shutdown timed out");
                    return Err(StoreError::ShutdownTimeout(pending));
                }
                tokio::time::sleep(self.config.shutdown_poll_interval).await;
            }
        }

        /// Spawn an effect onto the tokio runtime, tracking it for shutdown
        fn spawn_effect(&self, effect: Effect<A>) {
            if effect.is_none() {
                StoreMetrics::record_effect("none");
                return;
            }

            self.pending_effects.fetch_add(1, Ordering::SeqCst);
            let guard = PendingGuard(Arc::clone(&self.pending_effects));
            let run = self.run_effect(effect);

            tokio::spawn(async move {
                let _guard = guard;
                run.await;
            });
        }

        /// Build the future that executes one effect to completion
        ///
        /// `Parallel` children run concurrently inside the same task;
        /// `Sequential` children run in order, each awaited before the next.
        fn run_effect(&self, effect: Effect<A>) -> BoxedRun {
            let store = self.clone();

            Box::pin(async move {
                StoreMetrics::record_effect(effect.kind());
                match effect {
                    Effect::None => {},
                    Effect::Delay { duration, action } => {
                        let mut shutdown_rx = store.shutdown_signal.subscribe();
                        if *shutdown_rx.borrow_and_update() {
                            StoreMetrics::record_delay_cancelled();
                            return;
                        }
                        tokio::select! {
                            () = tokio::time::sleep(duration) => store.feed_back(*action).await,
                            _ = shutdown_rx.changed() => {
                                tracing::debug!("Delay effect cancelled by shutdown");
                                StoreMetrics::record_delay_cancelled();
                            },
                        }
                    },
                    Effect::Future(fut) => {
                        if let Some(action) = fut.await {
                            store.feed_back(action).await;
                        }
                    },
                    Effect::Parallel(effects) => {
                        let runs: Vec<BoxedRun> =
                            effects.into_iter().map(|e| store.run_effect(e)).collect();
                        futures::future::join_all(runs).await;
                    },
                    Effect::Sequential(effects) => {
                        for e in effects {
                            store.run_effect(e).await;
                        }
                    },
                }
            })
        }

        /// Broadcast an effect-produced action and send it back into the store
        async fn feed_back(&self, action: A) {
            // No receivers is not an error
            let _ = self.action_broadcast.send(action.clone());

            if let Err(error) = self.send(action).await {
                tracing::debug!(%error, "Effect-produced action dropped");
            }
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
        A: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: Arc::clone(&self.reducer),
                environment: Arc::clone(&self.environment),
                snapshots: Arc::clone(&self.snapshots),
                action_broadcast: self.action_broadcast.clone(),
                shutdown: Arc::clone(&self.shutdown),
                shutdown_signal: Arc::clone(&self.shutdown_signal),
                pending_effects: Arc::clone(&self.pending_effects),
                config: self.config,
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use komiut_core::{SmallVec, async_effect, delay, smallvec};

    #[derive(Debug, Clone, Default, PartialEq)]
    struct TestState {
        value: i32,
        log: Vec<&'static str>,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum TestAction {
        Increment,
        Schedule { millis: u64 },
        Spawn,
        Fanout,
        Ordered,
        Marked(&'static str),
    }

    struct TestReducer;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut TestState,
            action: TestAction,
            _env: &(),
        ) -> SmallVec<[Effect<TestAction>; 4]> {
            match action {
                TestAction::Increment => {
                    state.value += 1;
                    smallvec![Effect::None]
                },
                TestAction::Schedule { millis } => smallvec![delay! {
                    duration: Duration::from_millis(millis),
                    action: TestAction::Increment
                }],
                TestAction::Spawn => smallvec![async_effect! { Some(TestAction::Increment) }],
                TestAction::Fanout => smallvec![Effect::merge(vec![
                    async_effect! { Some(TestAction::Increment) },
                    async_effect! { Some(TestAction::Increment) },
                ])],
                TestAction::Ordered => smallvec![Effect::chain(vec![
                    async_effect! { Some(TestAction::Marked("first")) },
                    async_effect! { Some(TestAction::Marked("second")) },
                ])],
                TestAction::Marked(mark) => {
                    state.log.push(mark);
                    smallvec![Effect::None]
                },
            }
        }
    }

    fn test_store() -> Store<TestState, TestAction, (), TestReducer> {
        Store::new(TestState::default(), TestReducer, ())
    }

    async fn wait_for_value(store: &Store<TestState, TestAction, (), TestReducer>, expected: i32) {
        for _ in 0..200 {
            if store.state(|s| s.value).await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(store.state(|s| s.value).await, expected);
    }

    #[tokio::test]
    async fn test_send_returns_new_snapshot() {
        let store = test_store();
        let snapshot = store.send(TestAction::Increment).await.unwrap();
        assert_eq!(snapshot.value, 1);
        assert_eq!(store.snapshot().value, 1);
        assert_eq!(store.state(|s| s.value).await, 1);
    }

    #[tokio::test]
    async fn test_previous_snapshot_stays_valid() {
        let store = test_store();
        let before = store.snapshot();
        store.send(TestAction::Increment).await.unwrap();
        assert_eq!(before.value, 0);
        assert_eq!(store.snapshot().value, 1);
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let store = test_store();
        let mut rx = store.subscribe();
        store.send(TestAction::Increment).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().value, 1);
    }

    #[tokio::test]
    async fn test_delay_effect_feeds_back() {
        komiut_testing::init_test_tracing();
        let store = test_store();
        store.send(TestAction::Schedule { millis: 10 }).await.unwrap();
        assert_eq!(store.state(|s| s.value).await, 0);
        wait_for_value(&store, 1).await;
    }

    #[tokio::test]
    async fn test_future_effect_is_broadcast() {
        let store = test_store();
        let mut actions = store.subscribe_actions();
        store.send(TestAction::Spawn).await.unwrap();
        let produced = actions.recv().await.unwrap();
        assert_eq!(produced, TestAction::Increment);
        wait_for_value(&store, 1).await;
    }

    #[tokio::test]
    async fn test_parallel_effects_all_run() {
        let store = test_store();
        store.send(TestAction::Fanout).await.unwrap();
        wait_for_value(&store, 2).await;
    }

    #[tokio::test]
    async fn test_sequential_effects_keep_order() {
        let store = test_store();
        store.send(TestAction::Ordered).await.unwrap();
        for _ in 0..200 {
            if store.state(|s| s.log.len()).await == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(store.state(|s| s.log.clone()).await, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_actions() {
        let store = test_store();
        store.shutdown(Duration::from_secs(1)).await.unwrap();
        assert!(store.is_shutting_down());
        assert_eq!(
            store.send(TestAction::Increment).await,
            Err(StoreError::ShutdownInProgress)
        );
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending_delay() {
        komiut_testing::init_test_tracing();
        let store = test_store();
        store.send(TestAction::Schedule { millis: 60_000 }).await.unwrap();
        assert_eq!(store.pending_effects(), 1);

        store.shutdown(Duration::from_secs(1)).await.unwrap();
        assert_eq!(store.pending_effects(), 0);
        assert_eq!(store.state(|s| s.value).await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_sends_are_serialized() {
        let store = test_store();
        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.send(TestAction::Increment).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.state(|s| s.value).await, 20);
    }

    #[test]
    fn test_config_capacity_floor() {
        let config = StoreConfig::default().with_broadcast_capacity(0);
        assert_eq!(config.broadcast_capacity, 1);
    }
}
