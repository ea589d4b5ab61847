// src/engine/monitor.rs

//! Periodic progress reporting for a running session.

use std::fmt;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::status::StatusAggregator;

/// Point-in-time view of session progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total: usize,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }

    /// Completion percentage; an empty session counts as 100%.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.completed as f64 / self.total as f64) * 100.0
        }
    }
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} tasks complete ({:.0}%, {} succeeded, {} failed) after {:.1}s",
            self.completed,
            self.total,
            self.percent(),
            self.succeeded,
            self.failed,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Samples the aggregator every `interval` until all `total` tasks have an
/// outcome or it is told to stop.
#[derive(Debug, Clone)]
pub struct ProgressMonitor {
    aggregator: StatusAggregator,
    total: usize,
    interval: Duration,
    started: Instant,
}

impl ProgressMonitor {
    pub fn new(aggregator: StatusAggregator, total: usize, interval: Duration) -> Self {
        Self {
            aggregator,
            total,
            interval,
            started: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let counts = self.aggregator.counts();
        ProgressSnapshot {
            completed: counts.completed(),
            succeeded: counts.succeeded,
            failed: counts.failed,
            total: self.total,
            elapsed: self.started.elapsed(),
        }
    }

    /// Log a progress line at every tick.
    pub async fn run(self, stop: CancellationToken) -> ProgressSnapshot {
        self.run_with(stop, |snapshot| {
            info!(
                completed = snapshot.completed,
                total = snapshot.total,
                succeeded = snapshot.succeeded,
                failed = snapshot.failed,
                "progress: {snapshot}"
            );
        })
        .await
    }

    /// Call `on_tick` with a fresh snapshot at every tick (the first one
    /// fires immediately) and once more when stopped. Returns the last
    /// snapshot taken.
    pub async fn run_with<F>(self, stop: CancellationToken, mut on_tick: F) -> ProgressSnapshot
    where
        F: FnMut(&ProgressSnapshot) + Send,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = stop.cancelled() => {
                    let snapshot = self.snapshot();
                    on_tick(&snapshot);
                    return snapshot;
                }

                _ = ticker.tick() => {}
            }

            let snapshot = self.snapshot();
            on_tick(&snapshot);
            if snapshot.is_complete() {
                return snapshot;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskId;
    use crate::types::TaskStatus;

    #[tokio::test]
    async fn empty_session_completes_on_first_tick() {
        let monitor = ProgressMonitor::new(StatusAggregator::new("s"), 0, Duration::from_secs(60));
        let mut ticks = 0;
        let last = monitor
            .run_with(CancellationToken::new(), |_| ticks += 1)
            .await;
        assert_eq!(ticks, 1);
        assert!(last.is_complete());
        assert_eq!(last.percent(), 100.0);
    }

    #[tokio::test]
    async fn stops_once_every_task_has_an_outcome() {
        let agg = StatusAggregator::new("s");
        let monitor = ProgressMonitor::new(agg.clone(), 2, Duration::from_millis(10));

        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            agg.record_outcome(
                &TaskId::database("a", "a"),
                TaskStatus::Succeeded,
                Duration::ZERO,
                1,
            );
            tokio::time::sleep(Duration::from_millis(30)).await;
            agg.record_outcome(&TaskId::database("b", "b"), TaskStatus::Failed, Duration::ZERO, 3);
        });

        let mut seen = Vec::new();
        let last = tokio::time::timeout(
            Duration::from_secs(5),
            monitor.run_with(CancellationToken::new(), |s| seen.push(s.completed)),
        )
        .await
        .expect("monitor should finish");
        writer.await.unwrap();

        assert_eq!((last.succeeded, last.failed, last.total), (1, 1, 2));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn stop_token_ends_monitoring_early() {
        let monitor =
            ProgressMonitor::new(StatusAggregator::new("s"), 5, Duration::from_millis(10));
        let stop = CancellationToken::new();
        stop.cancel();
        let last = monitor.run_with(stop, |_| {}).await;
        assert_eq!(last.completed, 0);
        assert!(!last.is_complete());
    }

    #[test]
    fn display_is_human_readable() {
        let s = ProgressSnapshot {
            completed: 3,
            succeeded: 2,
            failed: 1,
            total: 4,
            elapsed: Duration::from_millis(1500),
        };
        assert_eq!(
            s.to_string(),
            "3/4 tasks complete (75%, 2 succeeded, 1 failed) after 1.5s"
        );
    }
}
