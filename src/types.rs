use std::fmt;
use std::str::FromStr;

/// One step of a task's pipeline.
///
/// Stages always run in the order of [`Stage::PIPELINE`]; a failing stage
/// short-circuits the rest of the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Extract,
    Prepare,
    Load,
    Verify,
}

impl Stage {
    /// Canonical pipeline order.
    pub const PIPELINE: [Stage; 4] = [Stage::Extract, Stage::Prepare, Stage::Load, Stage::Verify];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extract => "Extract",
            Stage::Prepare => "Prepare",
            Stage::Load => "Load",
            Stage::Verify => "Verify",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "extract" => Ok(Stage::Extract),
            "prepare" => Ok(Stage::Prepare),
            "load" => Ok(Stage::Load),
            "verify" => Ok(Stage::Verify),
            other => Err(format!(
                "invalid stage: {other} (expected extract, prepare, load or verify)"
            )),
        }
    }
}

/// Terminal status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Succeeded => "Succeeded",
            TaskStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "succeeded" => Ok(TaskStatus::Succeeded),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(format!(
                "invalid task status: {other} (expected \"Succeeded\" or \"Failed\")"
            )),
        }
    }
}

/// Lifecycle of a session's cancellation.
///
/// Transitions only move forward: `Running -> StopRequested -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CancelState {
    /// Normal operation; tasks are being dispatched.
    Running,
    /// A stop was requested; no new tasks are dispatched and in-flight
    /// executors are winding down.
    StopRequested,
    /// Every executor has terminated.
    Stopped,
}

impl Default for CancelState {
    fn default() -> Self {
        CancelState::Running
    }
}
