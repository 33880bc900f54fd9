//! API shared state

use std::sync::Arc;

use crate::actors::broadcast::Broadcaster;
use crate::actors::collector::CollectorHandle;
use crate::storage::StorageBackend;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Persistence gateway for targets, samples and alerts
    pub store: Arc<dyn StorageBackend>,

    /// Live-update channel that WebSocket viewers subscribe to
    pub broadcaster: Broadcaster,

    /// Connection tests are queued here so they run between cycles
    pub collector: CollectorHandle,

    /// Window for the recent averages in snapshots
    pub stats_window: chrono::Duration,
}

impl ApiState {
    pub fn new(
        store: Arc<dyn StorageBackend>,
        broadcaster: Broadcaster,
        collector: CollectorHandle,
        stats_window: chrono::Duration,
    ) -> Self {
        Self {
            store,
            broadcaster,
            collector,
            stats_window,
        }
    }
}
