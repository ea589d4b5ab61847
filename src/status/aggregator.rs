// src/status/aggregator.rs

//! Concurrent-safe record of one session's outcomes and errors.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tracing::{debug, warn};

use crate::status::journal::Journal;
use crate::status::records::{ErrorRecord, OutcomeRecord};
use crate::task::TaskId;
use crate::types::{Stage, TaskStatus};

/// Terminal record counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub succeeded: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn completed(&self) -> usize {
        self.succeeded + self.failed
    }
}

#[derive(Debug, Default)]
struct Records {
    outcomes: Vec<OutcomeRecord>,
    errors: Vec<ErrorRecord>,
    finished: HashSet<TaskId>,
    counts: StatusCounts,
    journal: Option<Journal>,
}

/// Shared, append-only store for a session.
///
/// Cloning is cheap; all clones see the same records. Every append happens
/// under a single write lock, so readers only ever observe whole records.
/// When a [`Journal`] is attached, the line is written while the lock is
/// held, keeping memory and disk in the same order.
#[derive(Debug, Clone)]
pub struct StatusAggregator {
    session_id: Arc<str>,
    records: Arc<RwLock<Records>>,
}

impl StatusAggregator {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Arc::from(session_id.into()),
            records: Arc::new(RwLock::new(Records::default())),
        }
    }

    /// Same as [`new`](Self::new), additionally persisting every record.
    pub fn with_journal(session_id: impl Into<String>, journal: Journal) -> Self {
        let aggregator = Self::new(session_id);
        aggregator.write().journal = Some(journal);
        aggregator
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Record the terminal outcome of `task`.
    ///
    /// Returns `None` (and leaves the store untouched) if the task already
    /// has an outcome.
    pub fn record_outcome(
        &self,
        task: &TaskId,
        status: TaskStatus,
        duration: Duration,
        attempts: u32,
    ) -> Option<OutcomeRecord> {
        let record = OutcomeRecord {
            task: task.clone(),
            status,
            duration,
            attempts,
            session_id: self.session_id.to_string(),
        };

        let mut records = self.write();
        if !records.finished.insert(task.clone()) {
            warn!(task = %task, "outcome already recorded for task; ignoring duplicate");
            return None;
        }

        match status {
            TaskStatus::Succeeded => records.counts.succeeded += 1,
            TaskStatus::Failed => records.counts.failed += 1,
        }
        if let Some(journal) = records.journal.as_mut() {
            if let Err(e) = journal.append_outcome(&record) {
                warn!(task = %task, error = %e, "failed to persist outcome record");
            }
        }
        records.outcomes.push(record.clone());

        debug!(task = %task, %status, attempts, "outcome recorded");
        Some(record)
    }

    /// Record one failed stage of one attempt.
    pub fn record_error(
        &self,
        task: &TaskId,
        stage: Stage,
        attempt: u32,
        message: impl Into<String>,
    ) -> ErrorRecord {
        let record = ErrorRecord {
            task: task.clone(),
            stage,
            attempt,
            message: message.into(),
            session_id: self.session_id.to_string(),
        };

        let mut records = self.write();
        if let Some(journal) = records.journal.as_mut() {
            if let Err(e) = journal.append_error(&record) {
                warn!(task = %task, error = %e, "failed to persist error record");
            }
        }
        records.errors.push(record.clone());

        record
    }

    /// Terminal outcome counts by status. O(1).
    pub fn counts(&self) -> StatusCounts {
        self.read().counts
    }

    /// Number of tasks with a terminal outcome.
    pub fn completed(&self) -> usize {
        self.counts().completed()
    }

    pub fn outcomes(&self) -> Vec<OutcomeRecord> {
        self.read().outcomes.clone()
    }

    pub fn errors(&self) -> Vec<ErrorRecord> {
        self.read().errors.clone()
    }

    pub fn errors_for(&self, task: &TaskId) -> Vec<ErrorRecord> {
        self.read()
            .errors
            .iter()
            .filter(|e| e.belongs_to(task))
            .cloned()
            .collect()
    }

    pub fn outcome_for(&self, task: &TaskId) -> Option<OutcomeRecord> {
        self.read()
            .outcomes
            .iter()
            .find(|o| &o.task == task)
            .cloned()
    }

    /// Error counts grouped by stage.
    pub fn stage_error_counts(&self) -> BTreeMap<Stage, usize> {
        let mut counts = BTreeMap::new();
        for err in self.read().errors.iter() {
            *counts.entry(err.stage).or_insert(0) += 1;
        }
        counts
    }

    fn read(&self) -> RwLockReadGuard<'_, Records> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Records> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_outcome_is_ignored() {
        let agg = StatusAggregator::new("s1");
        let task = TaskId::database("shop", "shop");

        assert!(agg
            .record_outcome(&task, TaskStatus::Succeeded, Duration::ZERO, 1)
            .is_some());
        assert!(agg
            .record_outcome(&task, TaskStatus::Failed, Duration::ZERO, 1)
            .is_none());

        assert_eq!(agg.counts(), StatusCounts { succeeded: 1, failed: 0 });
        assert_eq!(agg.outcomes().len(), 1);
    }

    #[test]
    fn errors_are_grouped_by_stage_and_task() {
        let agg = StatusAggregator::new("s1");
        let a = TaskId::table("shop", "shop", "a");
        let b = TaskId::table("shop", "shop", "b");

        agg.record_error(&a, Stage::Extract, 1, "x");
        agg.record_error(&a, Stage::Load, 2, "y");
        agg.record_error(&b, Stage::Extract, 1, "z");

        assert_eq!(agg.errors_for(&a).len(), 2);
        assert_eq!(agg.errors_for(&b).len(), 1);
        let by_stage = agg.stage_error_counts();
        assert_eq!(by_stage.get(&Stage::Extract), Some(&2));
        assert_eq!(by_stage.get(&Stage::Load), Some(&1));
        assert_eq!(agg.errors()[0].session_id, "s1");
    }

    #[test]
    fn concurrent_appends_are_not_lost() {
        let agg = StatusAggregator::new("s1");
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let agg = agg.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        let task = TaskId::table("db", "db", format!("t{i}_{j}"));
                        agg.record_error(&task, Stage::Extract, 1, "boom");
                        agg.record_outcome(&task, TaskStatus::Failed, Duration::ZERO, 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(agg.errors().len(), 400);
        assert_eq!(agg.counts().failed, 400);
    }

    #[test]
    fn journal_receives_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::create(dir.path(), "s2").unwrap();
        let agg = StatusAggregator::with_journal("s2", journal);
        let task = TaskId::database("crm", "crm_copy");

        agg.record_error(&task, Stage::Verify, 1, "empty");
        agg.record_outcome(&task, TaskStatus::Succeeded, Duration::from_secs(3), 2);

        let loaded = Journal::load(dir.path(), "s2").unwrap();
        assert_eq!(loaded.errors.len(), 1);
        assert_eq!(loaded.outcomes[0].task, task);
    }
}
