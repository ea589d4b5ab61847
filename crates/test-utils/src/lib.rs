pub mod builders;
pub mod fake_backend;

use std::sync::{Arc, Once};

use dbmirror::config::Tunables;
use dbmirror::engine::{Cancellation, Scheduler, SchedulerReport};
use dbmirror::exec::ExecutorSettings;
use dbmirror::status::StatusAggregator;
use dbmirror::task::Task;
use tracing_subscriber::{EnvFilter, fmt};

pub use fake_backend::FakeBackend;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `DBMIRROR_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("DBMIRROR_LOG")
            .unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Run `tasks` through a scheduler over `backend` and return the report
/// together with the aggregator it wrote to.
pub async fn run_tasks(
    backend: Arc<FakeBackend>,
    tunables: &Tunables,
    tasks: Vec<Task>,
    cancellation: Cancellation,
) -> (SchedulerReport, StatusAggregator) {
    let aggregator = StatusAggregator::new("test-session");
    let scheduler = Scheduler::new(
        backend,
        aggregator.clone(),
        ExecutorSettings::from(tunables),
        tunables.concurrency,
        cancellation,
    );
    let report = scheduler.run(tasks).await;
    (report, aggregator)
}
