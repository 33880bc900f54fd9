//! Connection status tracking
//!
//! The only writer of a target's connection state. Every poll outcome,
//! including a connection test, ends up in [`record_outcome`].

use std::fmt;

use serde::Serialize;
use tracing::{debug, error};

use super::session::SessionError;
use crate::storage::StorageBackend;
use crate::{Target, TargetStatus};

/// Why a unit counted as offline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Session(SessionError),
    /// The unit exceeded its cycle deadline
    CycleTimeout,
    /// The unit's task panicked
    UnitPanicked,
    /// The connection test command did not succeed
    TestCommandFailed,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Session(e) => write!(f, "{e}"),
            FailureReason::CycleTimeout => f.write_str("cycle deadline exceeded"),
            FailureReason::UnitPanicked => f.write_str("collection task panicked"),
            FailureReason::TestCommandFailed => f.write_str("test command failed"),
        }
    }
}

impl Serialize for FailureReason {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Outcome of one poll of one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "reason", rename_all = "lowercase")]
pub enum PollOutcome {
    Online,
    Offline(FailureReason),
}

impl PollOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Online)
    }

    pub fn status(&self) -> TargetStatus {
        if self.is_success() {
            TargetStatus::Online
        } else {
            TargetStatus::Offline
        }
    }
}

/// Persist the status transition for one outcome.
///
/// Storage errors are logged and swallowed.
pub async fn record_outcome(store: &dyn StorageBackend, target: &Target, outcome: &PollOutcome) {
    match outcome {
        PollOutcome::Online => debug!("{} is online", target.display()),
        PollOutcome::Offline(reason) => debug!("{} is offline: {reason}", target.display()),
    }

    if let Err(e) = store
        .update_target_status(target.id, outcome.status(), outcome.is_success())
        .await
    {
        error!("failed to update status of {}: {e}", target.display());
    }
}
