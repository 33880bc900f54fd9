//! Remote session execution
//!
//! One unit of work opens exactly one session to its target, runs the
//! fixed probe battery in declared order and closes the session again.
//! Probe failures are data ([`ProbeOutcome::Absent`]); only a failure to
//! establish the session aborts the unit.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, instrument, trace, warn};

use crate::Target;
use crate::config::CollectionConfig;

/// Command used to check that a session can run anything at all
const CONNECTION_TEST_COMMAND: &str = "echo 'connection test'";

/// How long closing a session may take before it is abandoned
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// One named remote command whose output maps to one sample field
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Probe {
    Cpu,
    Memory,
    Disk,
    LoadAverage,
    ProcessCount,
}

impl Probe {
    /// Every probe, in execution order
    pub const ALL: [Probe; 5] = [
        Probe::Cpu,
        Probe::Memory,
        Probe::Disk,
        Probe::LoadAverage,
        Probe::ProcessCount,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Probe::Cpu => "cpu",
            Probe::Memory => "memory",
            Probe::Disk => "disk",
            Probe::LoadAverage => "load",
            Probe::ProcessCount => "processes",
        }
    }

    /// Shell command run on the target
    pub fn command(&self) -> &'static str {
        match self {
            Probe::Cpu => "top -bn1 | grep 'Cpu(s)' | awk '{print $2}' | cut -d'%' -f1",
            Probe::Memory => "free | grep Mem | awk '{printf \"%.1f\", $3/$2 * 100.0}'",
            Probe::Disk => "df / | awk 'NR==2 {print $5}' | sed 's/%//'",
            Probe::LoadAverage => {
                "uptime | awk -F'load average:' '{print $2}' | awk '{print $1}' | tr -d ','"
            }
            Probe::ProcessCount => "ps aux | wc -l",
        }
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Session-level failure; the whole unit counts as offline
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("connection timed out")]
    Timeout,

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Field-level failure of a single probe
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeFailure {
    #[error("probe timed out")]
    Timeout,

    #[error("probe exited with status {0}")]
    NonZeroExit(u32),

    #[error("probe transport error: {0}")]
    Transport(String),
}

/// Result of running one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Trimmed stdout of a successful run
    Output(String),
    Absent(ProbeFailure),
}

impl ProbeOutcome {
    pub fn output(&self) -> Option<&str> {
        match self {
            ProbeOutcome::Output(text) => Some(text),
            ProbeOutcome::Absent(_) => None,
        }
    }
}

/// Per-probe results of one session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeResults(BTreeMap<Probe, ProbeOutcome>);

impl ProbeResults {
    pub fn insert(&mut self, probe: Probe, outcome: ProbeOutcome) {
        self.0.insert(probe, outcome);
    }

    pub fn get(&self, probe: Probe) -> Option<&ProbeOutcome> {
        self.0.get(&probe)
    }

    /// Output of a probe, `None` when it failed or never ran
    pub fn output(&self, probe: Probe) -> Option<&str> {
        self.get(probe).and_then(ProbeOutcome::output)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Probe, &ProbeOutcome)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Probe, ProbeOutcome)> for ProbeResults {
    fn from_iter<I: IntoIterator<Item = (Probe, ProbeOutcome)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Raw result of one remote command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_status: u32,
    pub stdout: String,
}

/// Opens sessions to targets
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self, target: &Target) -> Result<Box<dyn RemoteSession>, SessionError>;
}

/// An open session to one target.
///
/// Dropping a session must release its connection, so that a unit that
/// is cancelled or panics never leaks one.
#[async_trait]
pub trait RemoteSession: Send {
    async fn exec(&mut self, command: &str) -> Result<CommandOutput, ProbeFailure>;

    async fn close(&mut self);
}

/// Runs the probe battery against one target at a time
#[derive(Clone)]
pub struct SessionExecutor {
    connector: Arc<dyn SessionConnector>,
    connect_timeout: Duration,
    probe_timeout: Duration,
}

impl SessionExecutor {
    pub fn new(
        connector: Arc<dyn SessionConnector>,
        connect_timeout: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            connect_timeout,
            probe_timeout,
        }
    }

    pub fn from_config(connector: Arc<dyn SessionConnector>, config: &CollectionConfig) -> Self {
        Self::new(connector, config.connect_timeout(), config.probe_timeout())
    }

    /// Open a session, run every probe and close the session.
    ///
    /// Each probe has its own timeout; a failing probe does not stop the
    /// ones after it.
    #[instrument(skip_all, fields(target = %target.name))]
    pub async fn run_probes(&self, target: &Target) -> Result<ProbeResults, SessionError> {
        let mut session = self.open(target).await?;

        let mut results = ProbeResults::default();
        for probe in Probe::ALL {
            let outcome = self.run_probe(session.as_mut(), probe).await;
            results.insert(probe, outcome);
        }

        close(session.as_mut()).await;
        Ok(results)
    }

    /// Open a session and run a trivial command.
    ///
    /// Returns whether the command succeeded; session-level failures are
    /// returned as errors just like for a poll.
    #[instrument(skip_all, fields(target = %target.name))]
    pub async fn test_connection(&self, target: &Target) -> Result<bool, SessionError> {
        let mut session = self.open(target).await?;

        let success = match timeout(self.probe_timeout, session.exec(CONNECTION_TEST_COMMAND)).await
        {
            Ok(Ok(output)) => output.exit_status == 0,
            Ok(Err(e)) => {
                debug!("connection test command failed: {e}");
                false
            }
            Err(_) => {
                debug!("connection test command timed out");
                false
            }
        };

        close(session.as_mut()).await;
        Ok(success)
    }

    async fn open(&self, target: &Target) -> Result<Box<dyn RemoteSession>, SessionError> {
        trace!("connecting to {}", target.display());
        match timeout(self.connect_timeout, self.connector.connect(target)).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Timeout),
        }
    }

    async fn run_probe(&self, session: &mut dyn RemoteSession, probe: Probe) -> ProbeOutcome {
        let outcome = match timeout(self.probe_timeout, session.exec(probe.command())).await {
            Err(_) => ProbeOutcome::Absent(ProbeFailure::Timeout),
            Ok(Err(failure)) => ProbeOutcome::Absent(failure),
            Ok(Ok(output)) if output.exit_status != 0 => {
                ProbeOutcome::Absent(ProbeFailure::NonZeroExit(output.exit_status))
            }
            Ok(Ok(output)) => ProbeOutcome::Output(output.stdout.trim().to_string()),
        };

        match &outcome {
            ProbeOutcome::Output(text) => trace!("probe {probe}: {text:?}"),
            ProbeOutcome::Absent(failure) => debug!("probe {probe} absent: {failure}"),
        }

        outcome
    }
}

async fn close(session: &mut dyn RemoteSession) {
    if timeout(CLOSE_TIMEOUT, session.close()).await.is_err() {
        warn!("closing session timed out, dropping it");
    }
}
