//! NotifierActor - Delivers alert notifications off the collection path
//!
//! Units hand newly stored alerts to the actor through a bounded queue and
//! never wait for delivery. The alert row is already persisted at that
//! point, so a full queue only drops the outbound message.

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, instrument, warn};

use super::messages::AlertNotification;
use crate::Target;
use crate::alerts::AlertManager;
use crate::monitors::resources::AlertCandidate;

/// Notifications buffered while a slow endpoint is being served
pub const QUEUE_CAPACITY: usize = 128;

/// Actor that sends queued alerts one at a time
pub struct NotifierActor {
    manager: AlertManager,
    notification_rx: mpsc::Receiver<AlertNotification>,
}

impl NotifierActor {
    pub fn new(manager: AlertManager, notification_rx: mpsc::Receiver<AlertNotification>) -> Self {
        Self {
            manager,
            notification_rx,
        }
    }

    /// Runs until every handle has been dropped
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        info!("starting alert notifier");

        while let Some(notification) = self.notification_rx.recv().await {
            self.manager
                .send_alert(&notification.target, &notification.candidate)
                .await;
        }

        info!("alert notifier stopped");
    }
}

/// Handle for queueing notifications
#[derive(Debug, Clone)]
pub struct NotifierHandle {
    sender: mpsc::Sender<AlertNotification>,
}

impl NotifierHandle {
    /// Spawn the notifier actor as a tokio task
    pub fn spawn(manager: AlertManager) -> Self {
        Self::with_capacity(manager, QUEUE_CAPACITY)
    }

    pub fn with_capacity(manager: AlertManager, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        tokio::spawn(NotifierActor::new(manager, rx).run());
        Self { sender: tx }
    }

    /// Queue an alert without waiting; `false` if it was dropped
    pub fn notify(&self, target: &Target, candidate: &AlertCandidate) -> bool {
        let notification = AlertNotification {
            target: target.clone(),
            candidate: candidate.clone(),
        };

        match self.sender.try_send(notification) {
            Ok(()) => {
                debug!("queued {} alert for {}", candidate.kind, target.display());
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(
                    "notification queue full, dropping {} alert for {}",
                    candidate.kind,
                    target.display()
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!("notifier has stopped, dropping {} alert", candidate.kind);
                false
            }
        }
    }
}
