use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dbmirror::errors::BackendError;
use dbmirror::exec::{Artifact, BackendFuture, StageContext, StageReport, TransferBackend};
use dbmirror::task::TaskId;
use dbmirror::types::Stage;

/// Scripted behaviour for one (task, stage) pair.
#[derive(Debug, Clone)]
enum Behaviour {
    /// Fail every call, or only the first `times` calls.
    Fail { message: String, times: Option<usize> },
    /// Block until the call's token fires, then report `Cancelled`.
    Hang,
    /// Block forever, ignoring cancellation.
    Stuck,
}

/// A fake transfer backend that:
/// - succeeds by default after an optional delay
/// - fails, hangs or warns on scripted (task, stage) pairs
/// - serves scripted table lists for wildcard discovery
/// - records every call and the peak number of calls in flight
#[derive(Debug, Default)]
pub struct FakeBackend {
    delay: Duration,
    behaviours: HashMap<(TaskId, Stage), Behaviour>,
    warnings: HashMap<(TaskId, Stage), Vec<String>>,
    empty_artifacts: Vec<TaskId>,
    catalogs: HashMap<String, Result<Vec<String>, String>>,
    calls: Mutex<Vec<(TaskId, Stage)>>,
    listed: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stage call takes `delay` (cut short by cancellation).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_tables(mut self, source: &str, tables: &[&str]) -> Self {
        self.catalogs.insert(
            source.to_string(),
            Ok(tables.iter().map(|t| t.to_string()).collect()),
        );
        self
    }

    pub fn with_discovery_failure(mut self, source: &str, message: &str) -> Self {
        self.catalogs
            .insert(source.to_string(), Err(message.to_string()));
        self
    }

    pub fn fail_always(mut self, task: &TaskId, stage: Stage, message: &str) -> Self {
        self.behaviours.insert(
            (task.clone(), stage),
            Behaviour::Fail {
                message: message.to_string(),
                times: None,
            },
        );
        self
    }

    /// Fail the first `times` calls of `stage` for `task`, then succeed.
    pub fn fail_first(mut self, task: &TaskId, stage: Stage, times: usize, message: &str) -> Self {
        self.behaviours.insert(
            (task.clone(), stage),
            Behaviour::Fail {
                message: message.to_string(),
                times: Some(times),
            },
        );
        self
    }

    pub fn hang(mut self, task: &TaskId, stage: Stage) -> Self {
        self.behaviours.insert((task.clone(), stage), Behaviour::Hang);
        self
    }

    pub fn stuck(mut self, task: &TaskId, stage: Stage) -> Self {
        self.behaviours.insert((task.clone(), stage), Behaviour::Stuck);
        self
    }

    /// Succeed, but report `message` as a benign warning.
    pub fn warn(mut self, task: &TaskId, stage: Stage, message: &str) -> Self {
        self.warnings
            .entry((task.clone(), stage))
            .or_default()
            .push(message.to_string());
        self
    }

    /// Make extract for `task` report a zero-byte artifact.
    pub fn empty_artifact(mut self, task: &TaskId) -> Self {
        self.empty_artifacts.push(task.clone());
        self
    }

    /// Every stage call, in call order.
    pub fn calls(&self) -> Vec<(TaskId, Stage)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, task: &TaskId, stage: Stage) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, s)| t == task && *s == stage)
            .count()
    }

    /// Order in which tasks reached `Extract` for the first time.
    pub fn first_extract_order(&self) -> Vec<TaskId> {
        let mut seen = Vec::new();
        for (task, stage) in self.calls() {
            if stage == Stage::Extract && !seen.contains(&task) {
                seen.push(task);
            }
        }
        seen
    }

    /// Sources passed to `list_tables`.
    pub fn listed_sources(&self) -> Vec<String> {
        self.listed.lock().unwrap().clone()
    }

    /// Highest number of stage calls observed running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn stage_call(
        &self,
        task: &TaskId,
        stage: Stage,
        ctx: &StageContext,
    ) -> Result<Vec<String>, BackendError> {
        let call_number = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((task.clone(), stage));
            calls.iter().filter(|(t, s)| t == task && *s == stage).count()
        };
        let _in_flight = InFlight::enter(&self.in_flight, &self.peak);

        if !self.delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = ctx.cancel.cancelled() => return Err(BackendError::Cancelled),
            }
        }

        match self.behaviours.get(&(task.clone(), stage)) {
            Some(Behaviour::Fail { message, times }) => {
                if times.is_none_or(|n| call_number <= n) {
                    return Err(BackendError::Failed(message.clone()));
                }
            }
            Some(Behaviour::Hang) => {
                ctx.cancel.cancelled().await;
                return Err(BackendError::Cancelled);
            }
            Some(Behaviour::Stuck) => loop {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            },
            None => {}
        }

        Ok(self
            .warnings
            .get(&(task.clone(), stage))
            .cloned()
            .unwrap_or_default())
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl TransferBackend for FakeBackend {
    fn list_tables<'a>(
        &'a self,
        source: &'a str,
        _ctx: StageContext,
    ) -> BackendFuture<'a, Vec<String>> {
        Box::pin(async move {
            self.listed.lock().unwrap().push(source.to_string());
            match self.catalogs.get(source) {
                Some(Ok(tables)) => Ok(tables.clone()),
                Some(Err(message)) => Err(BackendError::Failed(message.clone())),
                None => Err(BackendError::Failed(format!("unknown database '{source}'"))),
            }
        })
    }

    fn extract<'a>(&'a self, task: &'a TaskId, ctx: StageContext) -> BackendFuture<'a, Artifact> {
        Box::pin(async move {
            let warnings = self.stage_call(task, Stage::Extract, &ctx).await?;
            let size = if self.empty_artifacts.contains(task) { 0 } else { 1024 };
            Ok(Artifact {
                path: PathBuf::from(format!("/fake/{}.dump", task.source)),
                size,
                warnings,
            })
        })
    }

    fn prepare<'a>(
        &'a self,
        task: &'a TaskId,
        ctx: StageContext,
    ) -> BackendFuture<'a, StageReport> {
        Box::pin(async move {
            let warnings = self.stage_call(task, Stage::Prepare, &ctx).await?;
            Ok(StageReport { warnings })
        })
    }

    fn load<'a>(
        &'a self,
        task: &'a TaskId,
        _artifact: &'a Artifact,
        ctx: StageContext,
    ) -> BackendFuture<'a, StageReport> {
        Box::pin(async move {
            let warnings = self.stage_call(task, Stage::Load, &ctx).await?;
            Ok(StageReport { warnings })
        })
    }

    fn verify<'a>(&'a self, task: &'a TaskId, ctx: StageContext) -> BackendFuture<'a, StageReport> {
        Box::pin(async move {
            let warnings = self.stage_call(task, Stage::Verify, &ctx).await?;
            Ok(StageReport { warnings })
        })
    }
}
