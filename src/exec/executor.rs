// src/exec/executor.rs

//! Runs one task's pipeline with bounded, fixed-delay retries.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Tunables;
use crate::errors::{BackendError, MirrorError};
use crate::exec::backend::{Artifact, StageContext, TransferBackend};
use crate::status::StatusAggregator;
use crate::task::{Task, TaskId};
use crate::types::{Stage, TaskStatus};

/// Timing knobs for an executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorSettings {
    /// Fixed pause between a failed attempt and the next one.
    pub retry_delay: Duration,
    /// Limit for each backend call.
    pub stage_timeout: Duration,
    /// Time a cancelled backend call gets to clean up.
    pub grace: Duration,
}

impl From<&Tunables> for ExecutorSettings {
    fn from(t: &Tunables) -> Self {
        Self {
            retry_delay: t.retry_delay,
            stage_timeout: t.stage_timeout,
            grace: t.stop_grace_period,
        }
    }
}

/// A failed stage within one attempt.
#[derive(Debug)]
struct StageFailure {
    stage: Stage,
    error: MirrorError,
}

impl StageFailure {
    fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            error: MirrorError::for_stage(stage, message),
        }
    }

    fn from_backend(stage: Stage, err: BackendError) -> Self {
        Self::new(stage, err.to_string())
    }

    fn message(&self) -> String {
        match &self.error {
            MirrorError::Extract(m)
            | MirrorError::Prepare(m)
            | MirrorError::Load(m)
            | MirrorError::Verification(m) => m.clone(),
            other => other.to_string(),
        }
    }
}

/// Drives tasks through `Extract -> Prepare -> Load -> Verify`.
///
/// Cheap to clone; the scheduler hands one clone to each spawned task.
#[derive(Clone)]
pub struct TaskExecutor {
    backend: Arc<dyn TransferBackend>,
    aggregator: StatusAggregator,
    settings: ExecutorSettings,
    cancel: CancellationToken,
}

impl TaskExecutor {
    pub fn new(
        backend: Arc<dyn TransferBackend>,
        aggregator: StatusAggregator,
        settings: ExecutorSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            backend,
            aggregator,
            settings,
            cancel,
        }
    }

    /// Run `task` until it succeeds, exhausts its attempts, or the session
    /// is cancelled. Exactly one outcome record is written.
    ///
    /// - Every failed stage writes an error record before the retry decision.
    /// - A failed attempt is retried from `Extract` after `retry_delay`.
    pub async fn run(&self, mut task: Task) -> TaskStatus {
        let started = Instant::now();
        let session = self.aggregator.session_id().to_string();

        loop {
            let attempt = task.begin_attempt();
            debug!(
                task = %task.id(),
                attempt,
                max_attempts = task.max_attempts(),
                session = %session,
                "starting attempt"
            );

            let failure = match self.run_attempt(&task, attempt).await {
                Ok(()) => {
                    let duration = started.elapsed();
                    info!(
                        task = %task.id(),
                        attempts = attempt,
                        duration = ?duration,
                        "task succeeded"
                    );
                    return self.finish(task.id(), TaskStatus::Succeeded, duration, attempt);
                }
                Err(failure) => failure,
            };

            self.aggregator
                .record_error(task.id(), failure.stage, attempt, failure.message());

            if self.cancel.is_cancelled() {
                warn!(
                    task = %task.id(),
                    stage = %failure.stage,
                    attempt,
                    "task interrupted by session cancellation"
                );
                return self.finish(task.id(), TaskStatus::Failed, started.elapsed(), attempt);
            }

            if !task.has_attempts_left() {
                error!(
                    task = %task.id(),
                    stage = %failure.stage,
                    attempts = attempt,
                    error = %failure.error,
                    "task failed; no attempts left"
                );
                return self.finish(task.id(), TaskStatus::Failed, started.elapsed(), attempt);
            }

            warn!(
                task = %task.id(),
                stage = %failure.stage,
                attempt,
                error = %failure.error,
                retry_in = ?self.settings.retry_delay,
                "attempt failed; will retry"
            );

            tokio::select! {
                _ = tokio::time::sleep(self.settings.retry_delay) => {}
                _ = self.cancel.cancelled() => {
                    warn!(task = %task.id(), attempt, "cancelled during retry delay");
                    return self.finish(task.id(), TaskStatus::Failed, started.elapsed(), attempt);
                }
            }
        }
    }

    fn finish(
        &self,
        task: &TaskId,
        status: TaskStatus,
        duration: Duration,
        attempts: u32,
    ) -> TaskStatus {
        self.aggregator.record_outcome(task, status, duration, attempts);
        status
    }

    /// One pass over the pipeline. The first failing stage ends the attempt.
    async fn run_attempt(&self, task: &Task, attempt: u32) -> Result<(), StageFailure> {
        let id = task.id();
        let mut artifact: Option<Artifact> = None;

        for &stage in task.stages() {
            // Safe point: don't start new work once the session is stopping.
            if self.cancel.is_cancelled() {
                return Err(StageFailure::from_backend(stage, BackendError::Cancelled));
            }

            let ctx = StageContext::new(
                self.settings.stage_timeout,
                self.settings.grace,
                &self.cancel,
            );

            let warnings = match stage {
                Stage::Extract => {
                    let extracted = ctx
                        .bound(self.backend.extract(id, ctx.clone()))
                        .await
                        .map_err(|e| StageFailure::from_backend(stage, e))?;
                    if extracted.size == 0 {
                        return Err(StageFailure::new(stage, "extract produced an empty artifact"));
                    }
                    let warnings = extracted.warnings.clone();
                    artifact = Some(extracted);
                    warnings
                }
                Stage::Prepare => {
                    ctx.bound(self.backend.prepare(id, ctx.clone()))
                        .await
                        .map_err(|e| StageFailure::from_backend(stage, e))?
                        .warnings
                }
                Stage::Load => {
                    let Some(artifact) = artifact.as_ref() else {
                        return Err(StageFailure::new(stage, "no artifact from extract"));
                    };
                    ctx.bound(self.backend.load(id, artifact, ctx.clone()))
                        .await
                        .map_err(|e| StageFailure::from_backend(stage, e))?
                        .warnings
                }
                Stage::Verify => {
                    ctx.bound(self.backend.verify(id, ctx.clone()))
                        .await
                        .map_err(|e| StageFailure::from_backend(stage, e))?
                        .warnings
                }
            };

            for warning in warnings {
                warn!(task = %id, %stage, attempt, %warning, "backend warning");
            }
            debug!(task = %id, %stage, attempt, "stage completed");
        }

        Ok(())
    }
}
