//! Wiring between the queue transport and the store.
//!
//! The WebSocket layer is an external collaborator: it produces raw text
//! frames and connection status changes. [`TransportSignal`] is that output,
//! and [`QueueSession`] folds it, together with passenger commands, through a
//! [`Store`] running the [`QueueReducer`].

use crate::config::QueueConfig;
use crate::reducer::{QueueAction, QueueEnvironment, QueueReducer};
use crate::state::{ConnectionState, QueueState};
use futures::{Stream, StreamExt};
use komiut_core::environment::{Clock, SystemClock};
use komiut_runtime::{Store, StoreConfig, StoreError};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Store running the queue reducer
pub type QueueStore = Store<QueueState, QueueAction, QueueEnvironment, QueueReducer>;

/// What the queue transport reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    /// One text frame from the socket
    Frame(String),
    /// The socket's status changed
    Connection {
        /// New status
        state: ConnectionState,
        /// Why, when known
        reason: Option<String>,
    },
}

impl TransportSignal {
    /// Connection status change without a reason
    #[must_use]
    pub const fn connection(state: ConnectionState) -> Self {
        Self::Connection {
            state,
            reason: None,
        }
    }
}

impl From<TransportSignal> for QueueAction {
    fn from(signal: TransportSignal) -> Self {
        match signal {
            TransportSignal::Frame(raw) => Self::FrameReceived { raw },
            TransportSignal::Connection { state, reason } => Self::ConnectionChanged { state, reason },
        }
    }
}

/// A live view of one route's queue.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct QueueSession {
    route_id: String,
    store: QueueStore,
    config: QueueConfig,
}

impl QueueSession {
    /// Open a view of `route_id`'s queue, starting empty and loading.
    #[must_use]
    pub fn open(route_id: impl Into<String>, environment: QueueEnvironment) -> Self {
        let route_id = route_id.into();
        let config = environment.config.clone();
        let store_config =
            StoreConfig::default().with_broadcast_capacity(config.broadcast_capacity);

        tracing::info!(%route_id, "Opening queue session");
        let store = Store::with_config(
            QueueState::new(route_id.clone()),
            QueueReducer::new(),
            environment,
            store_config,
        );

        Self {
            route_id,
            store,
            config,
        }
    }

    /// Open a session on the system clock with `config`
    #[must_use]
    pub fn with_config(route_id: impl Into<String>, config: QueueConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self::open(route_id, QueueEnvironment::new(clock).with_config(config))
    }

    /// Route this session follows
    #[must_use]
    pub fn route_id(&self) -> &str {
        &self.route_id
    }

    /// Fold one action into the session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`shutdown`](Self::shutdown).
    pub async fn dispatch(
        &self,
        action: impl Into<QueueAction>,
    ) -> Result<Arc<QueueState>, StoreError> {
        self.store.send(action.into()).await
    }

    /// Fold every signal of `signals`, in order, and return how many were folded.
    ///
    /// # Errors
    ///
    /// Stops at the first signal the store refuses.
    pub async fn ingest<S>(&self, signals: S) -> Result<usize, StoreError>
    where
        S: Stream<Item = TransportSignal>,
    {
        let mut signals = std::pin::pin!(signals);
        let mut folded = 0;

        while let Some(signal) = signals.next().await {
            self.dispatch(signal).await?;
            folded += 1;
        }

        tracing::debug!(route_id = %self.route_id, folded, "Transport stream ended");
        Ok(folded)
    }

    /// Pick a vehicle, optimistically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`shutdown`](Self::shutdown).
    pub async fn select_vehicle(
        &self,
        vehicle_id: impl Into<String>,
        seats_requested: u32,
    ) -> Result<Arc<QueueState>, StoreError> {
        self.dispatch(QueueAction::SelectVehicle {
            vehicle_id: vehicle_id.into(),
            seats_requested,
        })
        .await
    }

    /// Report that the server accepted the selection of `vehicle_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`shutdown`](Self::shutdown).
    pub async fn confirm_selection(
        &self,
        vehicle_id: impl Into<String>,
    ) -> Result<Arc<QueueState>, StoreError> {
        self.dispatch(QueueAction::SelectionConfirmed {
            vehicle_id: vehicle_id.into(),
        })
        .await
    }

    /// Report that the server refused the selection of `vehicle_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`shutdown`](Self::shutdown).
    pub async fn reject_selection(
        &self,
        vehicle_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Result<Arc<QueueState>, StoreError> {
        self.dispatch(QueueAction::SelectionRejected {
            vehicle_id: vehicle_id.into(),
            reason: reason.into(),
        })
        .await
    }

    /// Latest state
    #[must_use]
    pub fn snapshot(&self) -> Arc<QueueState> {
        self.store.snapshot()
    }

    /// Watch every published state
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<QueueState>> {
        self.store.subscribe()
    }

    /// Actions produced by effects, such as selection timeouts
    #[must_use]
    pub fn subscribe_actions(&self) -> broadcast::Receiver<QueueAction> {
        self.store.subscribe_actions()
    }

    /// Stop the session, cancelling any pending selection timer.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if running effects do not finish
    /// within the configured shutdown timeout.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        tracing::info!(route_id = %self.route_id, "Closing queue session");
        self.store.shutdown(self.config.shutdown_timeout).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use komiut_testing::test_clock;

    fn session() -> QueueSession {
        QueueSession::open("route-42", QueueEnvironment::new(Arc::new(test_clock())))
    }

    #[test]
    fn test_signal_conversion() {
        assert_eq!(
            QueueAction::from(TransportSignal::Frame("{}".to_string())),
            QueueAction::FrameReceived {
                raw: "{}".to_string()
            }
        );
        assert_eq!(
            QueueAction::from(TransportSignal::connection(ConnectionState::Reconnecting)),
            QueueAction::ConnectionChanged {
                state: ConnectionState::Reconnecting,
                reason: None
            }
        );
    }

    #[tokio::test]
    async fn test_ingest_counts_signals() {
        let session = session();
        let signals = futures::stream::iter(vec![
            TransportSignal::connection(ConnectionState::Connecting),
            TransportSignal::connection(ConnectionState::Connected),
            TransportSignal::Frame(
                r#"{"type":"queueSynced","routeId":"route-42","vehicles":[]}"#.to_string(),
            ),
        ]);

        assert_eq!(session.ingest(signals).await.unwrap(), 3);

        let state = session.snapshot();
        assert!(state.is_connected());
        assert!(!state.is_loading);
        assert_eq!(state.version().value(), 3);
    }

    #[tokio::test]
    async fn test_dispatch_after_shutdown_fails() {
        let session = session();
        session.shutdown().await.unwrap();

        assert_eq!(
            session.dispatch(QueueAction::SyncRequested).await,
            Err(StoreError::ShutdownInProgress)
        );
    }
}
