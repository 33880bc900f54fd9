//! FleetCollectorActor - Polls every registered target once per cycle
//!
//! ## Message Flow
//!
//! ```text
//! Timer → list targets → one task per target ─┐
//!   ↑                                         │ (session → parse → alerts → status)
//!   │                       join all units ←──┘
//!   │                            ↓
//!   │                  publish FleetEvent::Update → [viewers]
//!   └─── Commands (PollNow, TestTarget, UpdateInterval, Shutdown)
//! ```
//!
//! Units are isolated: every unit runs in its own task, so a slow, failing
//! or panicking target never blocks or aborts its siblings. A cycle is
//! complete once every unit has settled, and only then is the snapshot
//! published. Commands are handled between cycles, which keeps connection
//! tests from overlapping a unit of the same target.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, error, info, instrument, warn};

use super::broadcast::Broadcaster;
use super::messages::{CollectorCommand, CycleReport, FleetEvent, FleetSnapshot, TargetReport};
use super::notifier::NotifierHandle;
use crate::{Target, TargetId};
use crate::alerts::AlertManager;
use crate::config::Config;
use crate::monitors::parser::parse_sample;
use crate::monitors::resources::AlertEvaluator;
use crate::monitors::session::SessionExecutor;
use crate::monitors::status::{FailureReason, PollOutcome, record_outcome};
use crate::storage::StorageBackend;

/// Cleanup interval - run retention cleanup daily
const CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Timing and retention of the collection loop
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub interval: Duration,
    pub error_backoff: Duration,
    /// Upper bound for the session phase of one unit
    pub unit_deadline: Duration,
    pub stats_window: chrono::Duration,
    pub retention_days: Option<u32>,
}

impl CollectorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.collection.interval(),
            error_backoff: config.collection.error_backoff(),
            unit_deadline: config.collection.unit_deadline(),
            stats_window: config.stats_window(),
            retention_days: config.storage.retention_days(),
        }
    }
}

/// Everything one unit needs, cloned into its task
#[derive(Clone)]
struct UnitContext {
    store: Arc<dyn StorageBackend>,
    executor: SessionExecutor,
    evaluator: AlertEvaluator,
    deadline: Duration,
}

/// Actor that drives the perpetual collection cycle
pub struct FleetCollectorActor {
    unit: UnitContext,
    broadcaster: Broadcaster,
    command_rx: mpsc::Receiver<CollectorCommand>,
    settings: CollectorSettings,
    last_cleanup: Option<Instant>,
}

impl FleetCollectorActor {
    pub fn new(
        settings: CollectorSettings,
        store: Arc<dyn StorageBackend>,
        executor: SessionExecutor,
        notifier: Option<NotifierHandle>,
        broadcaster: Broadcaster,
        command_rx: mpsc::Receiver<CollectorCommand>,
    ) -> Self {
        let evaluator = AlertEvaluator::new(store.clone(), notifier);
        Self {
            unit: UnitContext {
                store,
                executor,
                evaluator,
                deadline: settings.unit_deadline,
            },
            broadcaster,
            command_rx,
            settings,
            last_cleanup: None,
        }
    }

    /// Run the actor's main loop
    ///
    /// The first cycle starts immediately. The loop ends on a Shutdown
    /// command or when every handle has been dropped.
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        info!(
            "starting fleet collector (interval {:?})",
            self.settings.interval
        );

        let mut next_cycle = Instant::now();
        let mut shutdown_ack = None;

        loop {
            tokio::select! {
                _ = sleep_until(next_cycle) => {
                    next_cycle = match self.run_cycle().await {
                        Ok(report) => {
                            debug!(
                                "cycle complete: {}/{} targets online",
                                report.online_count(),
                                report.targets.len()
                            );
                            Instant::now() + self.settings.interval
                        }
                        Err(e) => {
                            error!("collection cycle failed: {e:#}");
                            Instant::now() + self.settings.error_backoff
                        }
                    };
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(CollectorCommand::PollNow { respond_to }) => {
                            debug!("received PollNow command");
                            let result = self.run_cycle().await;
                            let _ = respond_to.send(result);
                        }

                        Some(CollectorCommand::TestTarget { target_id, respond_to }) => {
                            debug!("received TestTarget command for target {target_id}");
                            let result = self.test_target(target_id).await;
                            let _ = respond_to.send(result);
                        }

                        Some(CollectorCommand::UpdateInterval { interval_secs }) => {
                            debug!("updating interval to {interval_secs}s");
                            self.settings.interval = Duration::from_secs(interval_secs);
                            next_cycle = Instant::now() + self.settings.interval;
                        }

                        Some(CollectorCommand::Shutdown { respond_to }) => {
                            debug!("received shutdown command");
                            shutdown_ack = Some(respond_to);
                            break;
                        }

                        None => {
                            warn!("command channel closed, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        info!("fleet collector stopped");
        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
    }

    /// Poll every target concurrently and publish a snapshot
    #[instrument(skip(self))]
    async fn run_cycle(&mut self) -> Result<CycleReport> {
        let started_at = Utc::now();
        let targets = self
            .unit
            .store
            .list_targets()
            .await
            .context("failed to list targets")?;

        debug!("polling {} targets", targets.len());

        let units = targets.iter().cloned().map(|target| {
            let unit = self.unit.clone();
            tokio::spawn(poll_target(unit, target))
        });
        let results = join_all(units).await;

        let mut reports = Vec::with_capacity(targets.len());
        for (target, result) in targets.iter().zip(results) {
            let report = match result {
                Ok(report) => report,
                Err(e) => {
                    error!("unit for {} did not finish: {e}", target.display());
                    let outcome = PollOutcome::Offline(FailureReason::UnitPanicked);
                    record_outcome(self.unit.store.as_ref(), target, &outcome).await;
                    TargetReport::new(target, outcome)
                }
            };
            reports.push(report);
        }

        self.publish_snapshot().await;
        self.cleanup_if_due().await;

        Ok(CycleReport {
            started_at,
            finished_at: Utc::now(),
            targets: reports,
        })
    }

    async fn test_target(&self, target_id: TargetId) -> Result<Option<TargetReport>> {
        let Some(target) = self
            .unit
            .store
            .get_target(target_id)
            .await
            .context("failed to load target")?
        else {
            return Ok(None);
        };

        let report = test_target(self.unit.store.as_ref(), &self.unit.executor, &target).await;
        Ok(Some(report))
    }

    async fn publish_snapshot(&self) {
        match FleetSnapshot::capture(self.unit.store.as_ref(), self.settings.stats_window).await {
            Ok(snapshot) => self.broadcaster.publish(FleetEvent::Update(snapshot)),
            Err(e) => error!("failed to build fleet snapshot: {e}"),
        }
    }

    async fn cleanup_if_due(&mut self) {
        let Some(days) = self.settings.retention_days else {
            return;
        };
        if self
            .last_cleanup
            .is_some_and(|last| last.elapsed() < CLEANUP_INTERVAL)
        {
            return;
        }

        self.last_cleanup = Some(Instant::now());
        let cutoff = Utc::now() - chrono::Duration::days(days as i64);
        match self.unit.store.cleanup_old_samples(cutoff).await {
            Ok(deleted) => info!("retention cleanup removed {deleted} samples"),
            Err(e) => error!("retention cleanup failed: {e}"),
        }
    }
}

/// One target's unit of work: session, parse, persist, alerts, status
#[instrument(skip_all, fields(target = %target.name))]
async fn poll_target(unit: UnitContext, target: Target) -> TargetReport {
    let results = match timeout(unit.deadline, unit.executor.run_probes(&target)).await {
        Ok(Ok(results)) => results,
        Ok(Err(e)) => {
            return fail(&unit, &target, FailureReason::Session(e)).await;
        }
        Err(_) => {
            warn!("session phase exceeded {:?}", unit.deadline);
            return fail(&unit, &target, FailureReason::CycleTimeout).await;
        }
    };

    let mut report = TargetReport::new(&target, PollOutcome::Online);
    let sample = parse_sample(&results, Utc::now());

    if sample.has_usage() {
        match unit.store.insert_sample(target.id, &sample).await {
            Ok(()) => report.sample_stored = true,
            Err(e) => error!("failed to store sample: {e}"),
        }
    } else {
        debug!("every usage probe came back empty, not storing sample");
    }

    report.alerts_created = unit.evaluator.apply(&target, &sample).await;
    record_outcome(unit.store.as_ref(), &target, &report.outcome).await;

    report
}

async fn fail(unit: &UnitContext, target: &Target, reason: FailureReason) -> TargetReport {
    let outcome = PollOutcome::Offline(reason);
    record_outcome(unit.store.as_ref(), target, &outcome).await;
    TargetReport::new(target, outcome)
}

/// Open a session to one target and run a trivial command.
///
/// The result is recorded like any other poll outcome.
#[instrument(skip_all, fields(target = %target.name))]
pub async fn test_target(
    store: &dyn StorageBackend,
    executor: &SessionExecutor,
    target: &Target,
) -> TargetReport {
    let outcome = match executor.test_connection(target).await {
        Ok(true) => PollOutcome::Online,
        Ok(false) => PollOutcome::Offline(FailureReason::TestCommandFailed),
        Err(e) => PollOutcome::Offline(FailureReason::Session(e)),
    };
    record_outcome(store, target, &outcome).await;
    TargetReport::new(target, outcome)
}

/// Handle for controlling a FleetCollectorActor
///
/// Cheap to clone; the actor stops once every handle is dropped.
#[derive(Clone)]
pub struct CollectorHandle {
    sender: mpsc::Sender<CollectorCommand>,
}

impl CollectorHandle {
    /// Spawn the collector actor as a tokio task
    pub fn spawn(
        settings: CollectorSettings,
        store: Arc<dyn StorageBackend>,
        executor: SessionExecutor,
        notifier: Option<AlertManager>,
        broadcaster: Broadcaster,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let notifier = notifier.map(NotifierHandle::spawn);

        let actor =
            FleetCollectorActor::new(settings, store, executor, notifier, broadcaster, cmd_rx);

        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Run one cycle immediately and wait for its report
    pub async fn poll_now(&self) -> Result<CycleReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(CollectorCommand::PollNow { respond_to: tx })
            .await
            .context("failed to send PollNow command")?;

        rx.await.context("failed to receive response")?
    }

    /// Test the connection to one target once the current cycle is done.
    ///
    /// `None` if no such target is registered.
    pub async fn test_connection(&self, target_id: TargetId) -> Result<Option<TargetReport>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(CollectorCommand::TestTarget {
                target_id,
                respond_to: tx,
            })
            .await
            .context("failed to send TestTarget command")?;

        rx.await.context("failed to receive response")?
    }

    /// Update the pause between cycles
    pub async fn update_interval(&self, interval_secs: u64) -> Result<()> {
        self.sender
            .send(CollectorCommand::UpdateInterval { interval_secs })
            .await
            .context("failed to send UpdateInterval command")?;
        Ok(())
    }

    /// Stop the collector, waiting for an in-flight cycle to finish
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(CollectorCommand::Shutdown { respond_to: tx })
            .await
            .context("failed to send Shutdown command")?;
        rx.await.context("collector stopped without acknowledging")?;
        Ok(())
    }
}
