// src/task.rs

//! Units of work produced by the resolver and driven by executors.

use std::fmt;

use crate::types::Stage;

/// Identifies what a task copies: a whole database or a single table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId {
    pub source: String,
    pub dest: String,
    /// `None` means whole-database mode.
    pub table: Option<String>,
}

impl TaskId {
    pub fn database(source: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
            table: None,
        }
    }

    pub fn table(
        source: impl Into<String>,
        dest: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
            table: Some(table.into()),
        }
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table.as_deref()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{} -> {}.{}", self.source, table, self.dest, table),
            None => write!(f, "{} -> {}", self.source, self.dest),
        }
    }
}

/// A task: identity, its pipeline and the retry bookkeeping.
///
/// Everything but the attempt counter is fixed at resolution time. The
/// counter is advanced only by the executor that owns the task.
#[derive(Debug, Clone)]
pub struct Task {
    id: TaskId,
    stages: Vec<Stage>,
    attempt: u32,
    max_attempts: u32,
}

impl Task {
    pub fn new(id: TaskId, max_attempts: u32) -> Self {
        Self {
            id,
            stages: Stage::PIPELINE.to_vec(),
            attempt: 0,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Attempts started so far (0 before the first one).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Start the next attempt and return its 1-based number.
    pub(crate) fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }
}
