// src/exec/backend.rs

//! Pluggable transfer backend abstraction.
//!
//! The orchestration core never talks to a data store directly. It asks a
//! `TransferBackend` to enumerate tables and to run the four pipeline
//! stages, which keeps the scheduler and executor testable with a fake
//! backend.
//!
//! - [`CommandBackend`](super::CommandBackend) is the production
//!   implementation, running configured shell command templates.
//! - Tests provide their own `TransferBackend` that scripts failures,
//!   warnings and delays per task.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::errors::BackendError;
use crate::exec::process::KILL_MARGIN;
use crate::task::TaskId;

/// Boxed future returned by every backend call.
pub type BackendFuture<'a, T> =
    Pin<Box<dyn Future<Output = std::result::Result<T, BackendError>> + Send + 'a>>;

/// Per-call limits handed to the backend.
///
/// `cancel` fires when the call times out or the session is stopping; a
/// backend should then terminate whatever it spawned within `grace`.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub timeout: Duration,
    pub grace: Duration,
    pub cancel: CancellationToken,
}

impl StageContext {
    /// Create a context whose token is a child of the session token.
    pub fn new(timeout: Duration, grace: Duration, session: &CancellationToken) -> Self {
        Self {
            timeout,
            grace,
            cancel: session.child_token(),
        }
    }

    /// Drive a backend call to completion, enforcing the timeout.
    ///
    /// On timeout or cancellation the call's token is fired and the call is
    /// given `grace` (plus [`KILL_MARGIN`]) to clean up before it is dropped.
    pub async fn bound<T>(&self, mut fut: BackendFuture<'_, T>) -> Result<T, BackendError> {
        tokio::select! {
            biased;

            res = &mut fut => res,

            _ = self.cancel.cancelled() => {
                self.wind_down(fut).await;
                Err(BackendError::Cancelled)
            }

            _ = tokio::time::sleep(self.timeout) => {
                self.cancel.cancel();
                self.wind_down(fut).await;
                Err(BackendError::TimedOut(self.timeout))
            }
        }
    }

    async fn wind_down<T>(&self, fut: BackendFuture<'_, T>) {
        if tokio::time::timeout(self.grace + KILL_MARGIN, fut).await.is_err() {
            warn!(
                grace = ?self.grace,
                "backend call did not finish within grace period after cancellation; dropping it"
            );
        }
    }
}

/// Result of a successful extract: where the dump lives and how big it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub size: u64,
    /// Benign messages reported alongside the artifact.
    pub warnings: Vec<String>,
}

/// Result of a successful prepare / load / verify call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Benign messages reported alongside success.
    pub warnings: Vec<String>,
}

/// Trait abstracting the data movement operations.
///
/// Implementations must be shareable across concurrently running executors.
pub trait TransferBackend: Send + Sync {
    /// Enumerate the tables of a source database (used for `*` units).
    fn list_tables<'a>(
        &'a self,
        source: &'a str,
        ctx: StageContext,
    ) -> BackendFuture<'a, Vec<String>>;

    /// Dump the unit described by `task` into an artifact.
    fn extract<'a>(&'a self, task: &'a TaskId, ctx: StageContext) -> BackendFuture<'a, Artifact>;

    /// Make sure the destination database exists and can receive the load.
    fn prepare<'a>(&'a self, task: &'a TaskId, ctx: StageContext)
    -> BackendFuture<'a, StageReport>;

    /// Restore `artifact` into the destination.
    fn load<'a>(
        &'a self,
        task: &'a TaskId,
        artifact: &'a Artifact,
        ctx: StageContext,
    ) -> BackendFuture<'a, StageReport>;

    /// Confirm the destination object exists and is populated.
    fn verify<'a>(&'a self, task: &'a TaskId, ctx: StageContext) -> BackendFuture<'a, StageReport>;
}
