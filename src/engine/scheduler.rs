// src/engine/scheduler.rs

//! Bounded worker pool.
//!
//! Tasks are dispatched in list order; at most `limit` executors run at
//! once. Each spawned executor holds a semaphore permit for its lifetime,
//! so the permit count is the concurrency bound and the next task is
//! dispatched as soon as any executor finishes.
//!
//! On a stop request the scheduler stops dispatching (the remaining tasks
//! are reported as not started) and waits for the running executors. Any
//! executor still alive after the grace period plus the kill margin is
//! aborted and recorded as failed.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::engine::cancel::Cancellation;
use crate::exec::process::KILL_MARGIN;
use crate::exec::{ExecutorSettings, TaskExecutor, TransferBackend};
use crate::status::{StatusAggregator, StatusCounts};
use crate::task::{Task, TaskId};
use crate::types::TaskStatus;

/// What happened to the task list handed to [`Scheduler::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    /// Number of tasks that were handed to an executor.
    pub dispatched: usize,
    /// Tasks never dispatched because a stop was requested first.
    pub not_started: Vec<TaskId>,
    /// Executors aborted after the grace period expired.
    pub aborted: Vec<TaskId>,
    /// Highest number of executors observed running at once.
    pub peak_concurrency: usize,
    /// Outcome counts from the aggregator once every executor ended.
    pub counts: StatusCounts,
    pub stop_requested: bool,
}

/// Tracks the number of running executors.
#[derive(Debug, Default)]
struct ActivityGauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ActivityGauge {
    fn enter(self: &Arc<Self>) -> ActiveGuard {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ActiveGuard(Arc::clone(self))
    }
}

/// Decrements the gauge when the executor ends, including on abort.
struct ActiveGuard(Arc<ActivityGauge>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bookkeeping for a spawned executor, used if it never reports back.
#[derive(Debug)]
struct InFlight {
    task: TaskId,
    max_attempts: u32,
    started: Instant,
}

pub struct Scheduler {
    executor: TaskExecutor,
    aggregator: StatusAggregator,
    limit: usize,
    cancellation: Cancellation,
    gauge: Arc<ActivityGauge>,
}

impl Scheduler {
    pub fn new(
        backend: Arc<dyn TransferBackend>,
        aggregator: StatusAggregator,
        settings: ExecutorSettings,
        limit: usize,
        cancellation: Cancellation,
    ) -> Self {
        let executor = TaskExecutor::new(
            backend,
            aggregator.clone(),
            settings,
            cancellation.token(),
        );
        Self {
            executor,
            aggregator,
            limit: limit.max(1),
            cancellation,
            gauge: Arc::new(ActivityGauge::default()),
        }
    }

    /// Executors running right now.
    fn active(&self) -> usize {
        self.gauge.active.load(Ordering::SeqCst)
    }

    /// Run every task to a terminal outcome, or until a stop is requested.
    ///
    /// Marks the cancellation state `Stopped` before returning.
    pub async fn run(&self, tasks: Vec<Task>) -> SchedulerReport {
        let total = tasks.len();
        info!(tasks = total, limit = self.limit, "scheduler started");

        let semaphore = Arc::new(Semaphore::new(self.limit));
        let token = self.cancellation.token();
        let mut join_set: JoinSet<TaskStatus> = JoinSet::new();
        let mut in_flight: HashMap<Id, InFlight> = HashMap::new();
        let mut report = SchedulerReport::default();

        let mut pending = tasks.into_iter();
        for task in pending.by_ref() {
            let permit = tokio::select! {
                biased;

                _ = token.cancelled() => {
                    report.not_started.push(task.id().clone());
                    break;
                }

                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => {
                        // Only reachable if the semaphore were closed.
                        error!(error = %e, "worker pool closed; dispatch halted");
                        report.not_started.push(task.id().clone());
                        break;
                    }
                },
            };

            let bookkeeping = InFlight {
                task: task.id().clone(),
                max_attempts: task.max_attempts(),
                started: Instant::now(),
            };
            debug!(task = %bookkeeping.task, "dispatching task");

            let executor = self.executor.clone();
            let gauge = Arc::clone(&self.gauge);
            let handle = join_set.spawn(async move {
                let _permit = permit;
                let _active = gauge.enter();
                executor.run(task).await
            });
            in_flight.insert(handle.id(), bookkeeping);
            report.dispatched += 1;
        }
        report
            .not_started
            .extend(pending.map(|task| task.id().clone()));

        if !report.not_started.is_empty() {
            info!(
                not_started = report.not_started.len(),
                "dispatch stopped; remaining tasks will not run"
            );
        }

        self.drain(&mut join_set, &mut in_flight, &mut report).await;

        report.peak_concurrency = self.gauge.peak.load(Ordering::SeqCst);
        report.counts = self.aggregator.counts();
        report.stop_requested = self.cancellation.is_stop_requested();
        self.cancellation.mark_stopped();

        info!(
            dispatched = report.dispatched,
            succeeded = report.counts.succeeded,
            failed = report.counts.failed,
            not_started = report.not_started.len(),
            peak_concurrency = report.peak_concurrency,
            "scheduler finished"
        );
        report
    }

    /// Wait for every spawned executor, aborting stragglers once the grace
    /// period after a stop request has elapsed.
    async fn drain(
        &self,
        join_set: &mut JoinSet<TaskStatus>,
        in_flight: &mut HashMap<Id, InFlight>,
        report: &mut SchedulerReport,
    ) {
        let token = self.cancellation.token();
        let allowance = self.abort_allowance();
        let mut abort_at: Option<tokio::time::Instant> = None;
        let mut aborted = false;

        loop {
            tokio::select! {
                joined = join_set.join_next_with_id() => match joined {
                    None => break,
                    Some(Ok((id, status))) => {
                        if let Some(entry) = in_flight.remove(&id) {
                            debug!(task = %entry.task, %status, "executor finished");
                        }
                    }
                    Some(Err(err)) => {
                        if let Some(entry) = in_flight.remove(&err.id()) {
                            self.record_lost(entry, &err, report);
                        }
                    }
                },

                _ = token.cancelled(), if abort_at.is_none() => {
                    debug!(
                        running = join_set.len(),
                        allowance = ?allowance,
                        "waiting for running executors to wind down"
                    );
                    abort_at = Some(tokio::time::Instant::now() + allowance);
                }

                _ = tokio::time::sleep_until(abort_at.unwrap_or_else(tokio::time::Instant::now)),
                    if abort_at.is_some() && !aborted =>
                {
                    warn!(
                        running = join_set.len(),
                        "executors still running after the grace period; aborting them"
                    );
                    join_set.abort_all();
                    aborted = true;
                }
            }
        }
    }

    /// A backend call gets `grace` plus the kill margin to wind down; one
    /// more margin covers the executor recording its outcome.
    fn abort_allowance(&self) -> Duration {
        self.cancellation.grace() + KILL_MARGIN * 2
    }

    /// An executor ended without writing its outcome (aborted or panicked).
    fn record_lost(&self, entry: InFlight, err: &JoinError, report: &mut SchedulerReport) {
        let attempts = self
            .aggregator
            .errors_for(&entry.task)
            .iter()
            .map(|e| e.attempt)
            .max()
            .map_or(1, |last| last + 1)
            .min(entry.max_attempts);

        if err.is_cancelled() {
            warn!(task = %entry.task, attempts, "executor aborted");
            report.aborted.push(entry.task.clone());
        } else {
            error!(task = %entry.task, attempts, error = %err, "executor panicked");
        }

        self.aggregator.record_outcome(
            &entry.task,
            TaskStatus::Failed,
            entry.started.elapsed(),
            attempts,
        );
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("limit", &self.limit)
            .field("active", &self.active())
            .field("cancellation", &self.cancellation)
            .finish_non_exhaustive()
    }
}
