//! # Komiut Queue
//!
//! Real-time view of a matatu stage queue.
//!
//! The server pushes one JSON frame per queue change for a route. This crate
//! decodes those frames, folds them into a position-ordered [`QueueState`],
//! and tracks the passenger's optimistic vehicle selection until the server
//! answers or the selection times out.
//!
//! ## Layers
//!
//! - [`event`] / [`decode`]: wire frames to typed [`QueueEvent`]s, fail-soft
//! - [`reducer`]: the pure fold ([`reduce_event`]) and the store reducer
//! - [`feed`]: [`QueueSession`], which runs the reducer in a `komiut-runtime`
//!   store fed by transport signals
//!
//! ## Example
//!
//! ```no_run
//! use komiut_queue::{QueueConfig, QueueSession, TransportSignal};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = QueueSession::with_config("route-42", QueueConfig::from_env()?);
//! session
//!     .dispatch(TransportSignal::Frame(
//!         r#"{"type":"queueSynced","routeId":"route-42","vehicles":[]}"#.to_string(),
//!     ))
//!     .await?;
//!
//! let state = session.snapshot();
//! println!("{} vehicles, {} seats free", state.vehicle_count(), state.total_available_seats());
//! session.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod decode;
pub mod error;
pub mod event;
pub mod feed;
pub mod reducer;
pub mod selection;
pub mod state;
pub mod vehicle;

pub use config::{ConfigError, QueueConfig};
pub use error::{DecodeError, ErrorOrigin, QueueError};
pub use event::{QueueEvent, QueueEventBody, QueueEventType};
pub use feed::{QueueSession, QueueStore, TransportSignal};
pub use reducer::{QueueAction, QueueEnvironment, QueueReducer, reduce_event};
pub use selection::{PendingVehicleSelection, SelectionStatus};
pub use state::{ConnectionState, QueueState};
pub use vehicle::{QueueVehicle, VehicleStatus};

use metrics::describe_counter;

/// Register descriptions for the queue metrics (and the store's).
pub fn register_metrics() {
    komiut_runtime::metrics::register_metrics();
    describe_counter!(decode::FRAMES_DECODED, "Frames decoded by the strict path, by type");
    describe_counter!(
        decode::FRAMES_LENIENT,
        "Malformed frames recovered by the lenient path, by type"
    );
    describe_counter!(
        decode::FRAMES_REJECTED,
        "Frames turned into decode-error events, by reason"
    );
    describe_counter!(reducer::ACTIONS_REDUCED, "Queue actions reduced, by action");
}
