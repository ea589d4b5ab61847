// src/resolve/resolver.rs

//! Turns unit specifications into the session's ordered task list.

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Tunables;
use crate::errors::MirrorError;
use crate::exec::{StageContext, TransferBackend};
use crate::resolve::spec::{TableSelection, UnitSpec};
use crate::task::{Task, TaskId};

/// Tasks produced by resolution plus the units that could not be resolved.
#[derive(Debug, Default)]
pub struct Resolution {
    pub tasks: Vec<Task>,
    /// One `MirrorError::Resolution` per skipped unit.
    pub failures: Vec<MirrorError>,
}

impl Resolution {
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }
}

/// Resolves units against a backend (for wildcard discovery).
pub struct TaskResolver<'a> {
    backend: &'a dyn TransferBackend,
    tunables: &'a Tunables,
    cancel: CancellationToken,
}

impl<'a> TaskResolver<'a> {
    pub fn new(
        backend: &'a dyn TransferBackend,
        tunables: &'a Tunables,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            backend,
            tunables,
            cancel,
        }
    }

    /// Resolve every unit in order.
    ///
    /// A unit that is malformed or whose tables cannot be discovered is
    /// skipped and reported in [`Resolution::failures`]; the rest still
    /// resolve. Duplicate tasks (same source, destination and table) are kept
    /// once, at their first position.
    pub async fn resolve(&self, units: &[String]) -> Resolution {
        let mut resolution = Resolution::default();
        let mut seen: HashSet<TaskId> = HashSet::new();

        for unit in units {
            let ids = match self.resolve_unit(unit).await {
                Ok(ids) => ids,
                Err(err) => {
                    warn!(unit = %unit, error = %err, "skipping unit that failed to resolve");
                    resolution.failures.push(err);
                    continue;
                }
            };

            for id in ids {
                if !seen.insert(id.clone()) {
                    warn!(task = %id, unit = %unit, "duplicate task; keeping the first occurrence");
                    continue;
                }
                resolution
                    .tasks
                    .push(Task::new(id, self.tunables.max_attempts));
            }
        }

        info!(
            tasks = resolution.tasks.len(),
            failures = resolution.failure_count(),
            "task resolution finished"
        );

        resolution
    }

    async fn resolve_unit(&self, unit: &str) -> Result<Vec<TaskId>, MirrorError> {
        let spec: UnitSpec = unit.parse()?;
        let dest = spec.destination(&self.tunables.dest_prefix);

        let ids = match &spec.tables {
            TableSelection::WholeDatabase => vec![TaskId::database(&spec.source, &dest)],
            TableSelection::Tables(tables) => tables
                .iter()
                .map(|t| TaskId::table(&spec.source, &dest, t))
                .collect(),
            TableSelection::Wildcard => {
                let tables = self.discover_tables(unit, &spec.source).await?;
                tables
                    .iter()
                    .map(|t| TaskId::table(&spec.source, &dest, t))
                    .collect()
            }
        };

        debug!(unit = %unit, tasks = ids.len(), "unit resolved");
        Ok(ids)
    }

    async fn discover_tables(&self, unit: &str, source: &str) -> Result<Vec<String>, MirrorError> {
        let ctx = StageContext::new(
            self.tunables.stage_timeout,
            self.tunables.stop_grace_period,
            &self.cancel,
        );

        let mut tables = ctx
            .bound(self.backend.list_tables(source, ctx.clone()))
            .await
            .map_err(|e| MirrorError::resolution(unit, format!("table discovery failed: {e}")))?;

        let mut seen = HashSet::new();
        tables.retain(|t| !t.trim().is_empty() && seen.insert(t.clone()));

        if tables.is_empty() {
            return Err(MirrorError::resolution(
                unit,
                format!("table discovery found no tables in '{source}'"),
            ));
        }

        Ok(tables)
    }
}
