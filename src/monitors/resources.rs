//! Threshold alerts
//!
//! [`evaluate`] is pure: a sample and the target's thresholds go in, one
//! candidate per breached metric comes out. [`AlertEvaluator`] is the
//! stateful side that stores candidates through the deduplicating gateway
//! and queues a notification for every row it actually created.

use std::sync::Arc;

use tracing::{debug, error, instrument};

use crate::actors::notifier::NotifierHandle;
use crate::storage::{MetricKind, Severity, StorageBackend};
use crate::{Sample, Target, Thresholds};

/// Usage above which a CPU or memory alert is critical
pub const CRITICAL_USAGE: f32 = 90.0;

/// Usage above which a disk alert is critical
pub const CRITICAL_DISK_USAGE: f32 = 95.0;

/// An alert the evaluator wants to exist
#[derive(Debug, Clone, PartialEq)]
pub struct AlertCandidate {
    pub kind: MetricKind,
    pub severity: Severity,
    pub value: f32,
    pub threshold: u8,
    /// Deterministic text, part of the dedup key
    pub message: String,
}

/// Severity for a usage value, `None` while it does not exceed the threshold
pub fn severity_for(kind: MetricKind, usage: f32, threshold: u8) -> Option<Severity> {
    if usage <= threshold as f32 {
        return None;
    }

    let critical = match kind {
        MetricKind::Cpu | MetricKind::Memory => CRITICAL_USAGE,
        MetricKind::Disk => CRITICAL_DISK_USAGE,
    };

    if usage > critical {
        Some(Severity::Critical)
    } else {
        Some(Severity::Warning)
    }
}

pub fn alert_message(kind: MetricKind, usage: f32, threshold: u8) -> String {
    format!(
        "{} usage too high: {:.1}% (threshold: {}%)",
        kind.label(),
        usage,
        threshold
    )
}

/// One candidate per metric whose usage exceeds its threshold
pub fn evaluate(thresholds: &Thresholds, sample: &Sample) -> Vec<AlertCandidate> {
    [
        (MetricKind::Cpu, sample.cpu_usage, thresholds.cpu),
        (MetricKind::Memory, sample.memory_usage, thresholds.memory),
        (MetricKind::Disk, sample.disk_usage, thresholds.disk),
    ]
    .into_iter()
    .filter_map(|(kind, value, threshold)| {
        severity_for(kind, value, threshold).map(|severity| AlertCandidate {
            kind,
            severity,
            value,
            threshold,
            message: alert_message(kind, value, threshold),
        })
    })
    .collect()
}

/// Turns samples into stored alerts, skipping ones that are already open
#[derive(Clone)]
pub struct AlertEvaluator {
    store: Arc<dyn StorageBackend>,
    notifier: Option<NotifierHandle>,
}

impl AlertEvaluator {
    pub fn new(store: Arc<dyn StorageBackend>, notifier: Option<NotifierHandle>) -> Self {
        Self { store, notifier }
    }

    /// Evaluate a sample and persist new alerts.
    ///
    /// Returns how many alert rows were created. Storage errors are logged
    /// per candidate and never abort the remaining ones. Notifications are
    /// only queued, never awaited.
    #[instrument(skip_all, fields(target = %target.name))]
    pub async fn apply(&self, target: &Target, sample: &Sample) -> usize {
        let mut created = 0;

        for candidate in evaluate(&target.thresholds, sample) {
            match self
                .store
                .find_open_alert(target.id, candidate.kind, &candidate.message)
                .await
            {
                Ok(Some(_)) => {
                    debug!("{} alert already open: {}", candidate.kind, candidate.message);
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    error!("failed to look up open {} alert: {e}", candidate.kind);
                    continue;
                }
            }

            match self
                .store
                .insert_alert(
                    target.id,
                    candidate.kind,
                    &candidate.message,
                    candidate.severity,
                )
                .await
            {
                Ok(Some(row)) => {
                    debug!(
                        "raised {} {} alert #{}: {}",
                        row.severity, row.kind, row.id, row.message
                    );
                    created += 1;
                    if let Some(notifier) = &self.notifier {
                        notifier.notify(target, &candidate);
                    }
                }
                Ok(None) => {
                    debug!("{} alert raised concurrently, skipping", candidate.kind);
                }
                Err(e) => {
                    error!("failed to store {} alert: {e}", candidate.kind);
                }
            }
        }

        created
    }
}
