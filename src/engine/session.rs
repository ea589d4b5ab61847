// src/engine/session.rs

//! One orchestrator invocation: a run id, its aggregator, and the wiring
//! that runs the scheduler and progress monitor side by side.

use std::sync::Arc;

use chrono::Local;
use tracing::{debug, info, warn};

use crate::config::Tunables;
use crate::engine::cancel::Cancellation;
use crate::engine::monitor::{ProgressMonitor, ProgressSnapshot};
use crate::engine::scheduler::{Scheduler, SchedulerReport};
use crate::errors::Result;
use crate::exec::{ExecutorSettings, TransferBackend};
use crate::status::{Journal, StatusAggregator};
use crate::task::Task;

/// Time-derived run id, unique per invocation: `YYYYmmdd-HHMMSS-<pid>`.
pub fn new_session_id() -> String {
    format!("{}-{}", Local::now().format("%Y%m%d-%H%M%S"), std::process::id())
}

/// Result of [`Session::execute`].
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub scheduler: SchedulerReport,
    /// Last progress snapshot taken by the monitor.
    pub progress: ProgressSnapshot,
}

#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    aggregator: StatusAggregator,
}

impl Session {
    /// Session with the given id and an in-memory aggregator.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            aggregator: StatusAggregator::new(id.clone()),
            id,
        }
    }

    /// Start a fresh session, attaching a journal when `journal_dir` is set.
    pub fn open(tunables: &Tunables) -> Result<Self> {
        let id = new_session_id();
        let aggregator = match &tunables.journal_dir {
            Some(dir) => StatusAggregator::with_journal(id.clone(), Journal::create(dir, &id)?),
            None => {
                debug!("no journal_dir configured; records stay in memory");
                StatusAggregator::new(id.clone())
            }
        };
        Ok(Self { id, aggregator })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn aggregator(&self) -> &StatusAggregator {
        &self.aggregator
    }

    /// Run `tasks` to completion (or until cancelled) with the progress
    /// monitor reporting alongside.
    pub async fn execute(
        &self,
        tasks: Vec<Task>,
        backend: Arc<dyn TransferBackend>,
        tunables: &Tunables,
        cancellation: &Cancellation,
    ) -> SessionOutcome {
        let total = tasks.len();
        info!(
            session = %self.id,
            tasks = total,
            concurrency = tunables.concurrency,
            "session started"
        );

        let monitor =
            ProgressMonitor::new(self.aggregator.clone(), total, tunables.progress_interval);
        let monitor_stop = cancellation.token().child_token();
        let monitor_handle = tokio::spawn(monitor.clone().run(monitor_stop.clone()));

        let scheduler = Scheduler::new(
            backend,
            self.aggregator.clone(),
            ExecutorSettings::from(tunables),
            tunables.concurrency,
            cancellation.clone(),
        );
        let report = scheduler.run(tasks).await;

        monitor_stop.cancel();
        let progress = match monitor_handle.await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "progress monitor ended abnormally");
                monitor.snapshot()
            }
        };

        info!(
            session = %self.id,
            succeeded = report.counts.succeeded,
            failed = report.counts.failed,
            not_started = report.not_started.len(),
            elapsed = ?progress.elapsed,
            "session finished"
        );

        SessionOutcome {
            scheduler: report,
            progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn session_ids_are_time_and_pid_derived() {
        let id = new_session_id();
        let (stamp, pid) = id.rsplit_once('-').unwrap();
        assert_eq!(pid, std::process::id().to_string());
        assert_eq!(stamp.len(), "20240101-120000".len());
        assert!(stamp.chars().all(|c| c.is_ascii_digit() || c == '-'));
    }

    #[test]
    fn open_attaches_journal_when_configured() {
        let dir = tempdir().unwrap();
        let tunables = Tunables {
            journal_dir: Some(dir.path().to_path_buf()),
            ..Tunables::default()
        };
        let session = Session::open(&tunables).unwrap();
        assert!(dir.path().join(format!("{}.outcomes", session.id())).exists());
        assert_eq!(session.aggregator().session_id(), session.id());
    }
}
