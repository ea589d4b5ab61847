use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use dbmirror::config::Tunables;
use dbmirror::exec::{ExecutorSettings, TaskExecutor};
use dbmirror::status::StatusAggregator;
use dbmirror::task::{Task, TaskId};
use dbmirror::types::{Stage, TaskStatus};
use dbmirror_test_utils::builders::TunablesBuilder;
use dbmirror_test_utils::{FakeBackend, init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn setup(backend: &Arc<FakeBackend>, tunables: &Tunables) -> (TaskExecutor, StatusAggregator) {
    let aggregator = StatusAggregator::new("retry-test");
    let executor = TaskExecutor::new(
        backend.clone(),
        aggregator.clone(),
        ExecutorSettings::from(tunables),
        CancellationToken::new(),
    );
    (executor, aggregator)
}

#[tokio::test]
async fn extract_failing_every_attempt_exhausts_the_bound() -> TestResult {
    init_tracing();

    let id = TaskId::table("shop", "shop", "orders");
    let backend =
        Arc::new(FakeBackend::new().fail_always(&id, Stage::Extract, "connection refused"));
    let tunables = TunablesBuilder::new().max_attempts(3).build();
    let (executor, aggregator) = setup(&backend, &tunables);

    let status = with_timeout(executor.run(Task::new(id.clone(), 3))).await;
    assert_eq!(status, TaskStatus::Failed);

    let errors = aggregator.errors_for(&id);
    assert_eq!(errors.len(), 3);
    assert!(errors.iter().all(|e| e.stage == Stage::Extract));
    assert_eq!(errors.iter().map(|e| e.attempt).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(errors.iter().all(|e| e.message == "connection refused"));

    let outcome = aggregator.outcome_for(&id).ok_or("missing outcome")?;
    assert_eq!(outcome.status, TaskStatus::Failed);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.session_id, "retry-test");
    assert_eq!(aggregator.outcomes().len(), 1);

    // A failed stage aborts the rest of the attempt.
    assert_eq!(backend.calls_for(&id, Stage::Prepare), 0);
    assert_eq!(backend.calls_for(&id, Stage::Load), 0);

    Ok(())
}

#[tokio::test]
async fn flaky_load_succeeds_before_the_bound() -> TestResult {
    init_tracing();

    let id = TaskId::database("crm", "crm");
    let backend = Arc::new(FakeBackend::new().fail_first(&id, Stage::Load, 2, "lock wait timeout"));
    let tunables = TunablesBuilder::new().max_attempts(3).build();
    let (executor, aggregator) = setup(&backend, &tunables);

    let status = with_timeout(executor.run(Task::new(id.clone(), 3))).await;
    assert_eq!(status, TaskStatus::Succeeded);

    let errors = aggregator.errors_for(&id);
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|e| e.stage == Stage::Load));

    let outcome = aggregator.outcome_for(&id).ok_or("missing outcome")?;
    assert_eq!(outcome.attempts, 3);

    // Every retry restarts the pipeline from Extract.
    assert_eq!(backend.calls_for(&id, Stage::Extract), 3);
    assert_eq!(backend.calls_for(&id, Stage::Verify), 1);

    Ok(())
}

#[tokio::test]
async fn warnings_do_not_consume_attempts() -> TestResult {
    init_tracing();

    let id = TaskId::table("shop", "shop", "users");
    let backend = Arc::new(
        FakeBackend::new()
            .warn(
                &id,
                Stage::Extract,
                "Using a password on the command line interface can be insecure",
            )
            .warn(&id, Stage::Load, "Warning: 1 row truncated"),
    );
    let tunables = TunablesBuilder::new().build();
    let (executor, aggregator) = setup(&backend, &tunables);

    let status = with_timeout(executor.run(Task::new(id.clone(), 3))).await;
    assert_eq!(status, TaskStatus::Succeeded);
    assert!(aggregator.errors().is_empty());
    assert_eq!(aggregator.outcome_for(&id).ok_or("missing outcome")?.attempts, 1);

    Ok(())
}

#[tokio::test]
async fn verification_failure_is_retried_like_load() -> TestResult {
    init_tracing();

    let id = TaskId::table("shop", "shop", "orders");
    let backend = Arc::new(FakeBackend::new().fail_first(&id, Stage::Verify, 1, "table is empty"));
    let tunables = TunablesBuilder::new().build();
    let (executor, aggregator) = setup(&backend, &tunables);

    let status = with_timeout(executor.run(Task::new(id.clone(), 3))).await;
    assert_eq!(status, TaskStatus::Succeeded);

    let errors = aggregator.errors_for(&id);
    assert_eq!(errors.len(), 1);
    assert_eq!((errors[0].stage, errors[0].attempt), (Stage::Verify, 1));
    assert_eq!(backend.calls_for(&id, Stage::Load), 2);
    assert_eq!(aggregator.outcome_for(&id).ok_or("missing outcome")?.attempts, 2);

    Ok(())
}

#[tokio::test]
async fn stage_timeout_is_a_stage_failure() -> TestResult {
    init_tracing();

    let id = TaskId::database("slow", "slow");
    let backend = Arc::new(FakeBackend::new().hang(&id, Stage::Prepare));
    let tunables = TunablesBuilder::new()
        .max_attempts(2)
        .stage_timeout(Duration::from_millis(50))
        .build();
    let (executor, aggregator) = setup(&backend, &tunables);

    let status = with_timeout(executor.run(Task::new(id.clone(), 2))).await;
    assert_eq!(status, TaskStatus::Failed);

    let errors = aggregator.errors_for(&id);
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|e| e.stage == Stage::Prepare));
    assert!(errors[0].message.contains("timed out"), "{}", errors[0].message);

    Ok(())
}

#[tokio::test]
async fn empty_artifact_fails_extract() -> TestResult {
    init_tracing();

    let id = TaskId::table("shop", "shop", "ghost");
    let backend = Arc::new(FakeBackend::new().empty_artifact(&id));
    let tunables = TunablesBuilder::new().max_attempts(1).build();
    let (executor, aggregator) = setup(&backend, &tunables);

    let status = with_timeout(executor.run(Task::new(id.clone(), 1))).await;
    assert_eq!(status, TaskStatus::Failed);

    let errors = aggregator.errors_for(&id);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].stage, Stage::Extract);
    assert!(errors[0].message.contains("empty artifact"));
    assert_eq!(backend.calls_for(&id, Stage::Load), 0);

    Ok(())
}

#[tokio::test]
async fn retry_waits_for_the_configured_delay() -> TestResult {
    init_tracing();

    let id = TaskId::database("crm", "crm");
    let backend = Arc::new(FakeBackend::new().fail_first(&id, Stage::Extract, 1, "reset by peer"));
    let tunables = TunablesBuilder::new()
        .retry_delay(Duration::from_millis(150))
        .build();
    let (executor, aggregator) = setup(&backend, &tunables);

    let status = with_timeout(executor.run(Task::new(id.clone(), 3))).await;
    assert_eq!(status, TaskStatus::Succeeded);

    let outcome = aggregator.outcome_for(&id).ok_or("missing outcome")?;
    assert!(outcome.duration >= Duration::from_millis(150), "{:?}", outcome.duration);

    Ok(())
}
