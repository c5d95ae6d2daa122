//! Relay that accumulates per-function call counts sent by instrumented
//! applications and periodically forwards them, grouped by project and
//! environment, to a remote collection API.

use std::sync::Arc;

pub mod auth;
pub mod config;
pub mod flush;
pub mod handlers;
pub mod logging;
pub mod middleware;
pub mod samples;
pub mod server;
pub mod upstream;

use flush::FlushController;
use samples::SampleAggregator;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Accumulated call counts. Handlers only read it directly for snapshots.
    pub samples: Arc<SampleAggregator>,

    /// Merges ingested batches and decides when to ship them.
    pub flush: Arc<FlushController>,
}
