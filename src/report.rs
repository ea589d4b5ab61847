// src/report.rs

//! Final session report, built from a live aggregator or a journal on disk.

use std::collections::BTreeMap;
use std::fmt;

use crate::errors::MirrorError;
use crate::status::{ErrorRecord, JournalContents, OutcomeRecord, StatusAggregator};
use crate::task::TaskId;
use crate::types::{Stage, TaskStatus};

#[derive(Debug, Clone, Default)]
pub struct SessionReport {
    pub session_id: String,
    /// In the order they were recorded.
    pub outcomes: Vec<OutcomeRecord>,
    pub errors: Vec<ErrorRecord>,
    pub resolution_failures: Vec<String>,
    pub not_started: Vec<TaskId>,
}

impl SessionReport {
    pub fn from_aggregator(
        aggregator: &StatusAggregator,
        resolution_failures: &[MirrorError],
        not_started: Vec<TaskId>,
    ) -> Self {
        Self {
            session_id: aggregator.session_id().to_string(),
            outcomes: aggregator.outcomes(),
            errors: aggregator.errors(),
            resolution_failures: resolution_failures.iter().map(ToString::to_string).collect(),
            not_started,
        }
    }

    /// Rebuild a report from a session journal. Resolution failures and
    /// not-started tasks are not journaled, so those sections are empty.
    pub fn from_journal(session_id: impl Into<String>, contents: JournalContents) -> Self {
        Self {
            session_id: session_id.into(),
            outcomes: contents.outcomes,
            errors: contents.errors,
            ..Self::default()
        }
    }

    pub fn succeeded(&self) -> usize {
        self.count(TaskStatus::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(TaskStatus::Failed)
    }

    /// True when every task succeeded and nothing was skipped.
    pub fn is_clean(&self) -> bool {
        self.failed() == 0 && self.not_started.is_empty() && self.resolution_failures.is_empty()
    }

    pub fn stage_error_counts(&self) -> BTreeMap<Stage, usize> {
        let mut counts = BTreeMap::new();
        for err in &self.errors {
            *counts.entry(err.stage).or_insert(0) += 1;
        }
        counts
    }

    /// Most recent error recorded for `task`.
    pub fn last_error_for(&self, task: &TaskId) -> Option<&ErrorRecord> {
        self.errors.iter().rev().find(|e| e.belongs_to(task))
    }

    fn count(&self, status: TaskStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "dbmirror session {}", self.session_id)?;

        if !self.outcomes.is_empty() {
            writeln!(f)?;
            writeln!(f, "tasks ({}):", self.outcomes.len())?;
        }
        for outcome in &self.outcomes {
            write!(
                f,
                "  {:<9} {}  attempts={}  duration={:.1}s",
                outcome.status.as_str(),
                outcome.task,
                outcome.attempts,
                outcome.duration.as_secs_f64()
            )?;
            if outcome.status == TaskStatus::Failed {
                if let Some(err) = self.last_error_for(&outcome.task) {
                    write!(f, "  last error: [{}] {}", err.stage, err.message)?;
                }
            }
            writeln!(f)?;
        }

        let stage_errors = self.stage_error_counts();
        if !stage_errors.is_empty() {
            writeln!(f)?;
            writeln!(f, "errors by stage:")?;
            for (stage, count) in &stage_errors {
                writeln!(f, "  {stage}: {count}")?;
            }
        }

        if !self.resolution_failures.is_empty() {
            writeln!(f)?;
            writeln!(f, "resolution failures ({}):", self.resolution_failures.len())?;
            for failure in &self.resolution_failures {
                writeln!(f, "  - {failure}")?;
            }
        }

        if !self.not_started.is_empty() {
            writeln!(f)?;
            writeln!(f, "not started ({}):", self.not_started.len())?;
            for task in &self.not_started {
                writeln!(f, "  - {task}")?;
            }
        }

        writeln!(f)?;
        write!(
            f,
            "totals: {} succeeded, {} failed, {} not started, {} unresolved units",
            self.succeeded(),
            self.failed(),
            self.not_started.len(),
            self.resolution_failures.len()
        )
    }
}
