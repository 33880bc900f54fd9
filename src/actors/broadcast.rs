//! Fan-out of fleet events to attached viewers

use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::messages::FleetEvent;

/// Default number of events buffered per slow viewer
pub const DEFAULT_CAPACITY: usize = 64;

/// Publish side of the live-update channel
///
/// Publishing never fails: with no viewers attached the event is dropped,
/// and viewers that fall behind skip events.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    sender: broadcast::Sender<FleetEvent>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: FleetEvent) {
        match self.sender.send(event) {
            Ok(receivers) => trace!("published fleet event to {receivers} viewers"),
            Err(_) => trace!("no viewers attached, dropping fleet event"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.sender.subscribe()
    }

    pub fn viewer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Publish a ping every `every`, independent of collection cycles.
///
/// Runs until the returned task is aborted.
pub fn spawn_heartbeat(broadcaster: Broadcaster, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("starting heartbeat every {every:?}");
        let mut ticker = tokio::time::interval(every);
        // first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            broadcaster.publish(FleetEvent::Ping {
                timestamp: Utc::now(),
            });
        }
    })
}
