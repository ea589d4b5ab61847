use std::error::Error;

use tokio_util::sync::CancellationToken;

use dbmirror::errors::MirrorError;
use dbmirror::resolve::TaskResolver;
use dbmirror::task::TaskId;
use dbmirror_test_utils::builders::TunablesBuilder;
use dbmirror_test_utils::{FakeBackend, init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn units(specs: &[&str]) -> Vec<String> {
    specs.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn wildcard_expands_to_one_task_per_table() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new().with_tables("shop", &["a", "b", "c"]);
    let tunables = TunablesBuilder::new().max_attempts(4).build();
    let resolver = TaskResolver::new(&backend, &tunables, CancellationToken::new());

    let resolution = with_timeout(resolver.resolve(&units(&["shop:mirror:*"]))).await;

    assert_eq!(resolution.failure_count(), 0);
    let ids: Vec<&TaskId> = resolution.tasks.iter().map(|t| t.id()).collect();
    assert_eq!(
        ids,
        vec![
            &TaskId::table("shop", "mirror", "a"),
            &TaskId::table("shop", "mirror", "b"),
            &TaskId::table("shop", "mirror", "c"),
        ]
    );
    assert!(resolution.tasks.iter().all(|t| t.max_attempts() == 4));
    assert!(resolution.tasks.iter().all(|t| t.attempt() == 0));
    assert_eq!(backend.listed_sources(), vec!["shop".to_string()]);

    Ok(())
}

#[tokio::test]
async fn malformed_unit_is_skipped_and_the_rest_resolve() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new();
    let tunables = TunablesBuilder::new().build();
    let resolver = TaskResolver::new(&backend, &tunables, CancellationToken::new());

    let resolution = with_timeout(resolver.resolve(&units(&[
        "crm",
        "a:b:c:d",
        "shop:orders, users",
    ])))
    .await;

    assert_eq!(resolution.failure_count(), 1);
    assert!(matches!(
        &resolution.failures[0],
        MirrorError::Resolution { unit, .. } if unit == "a:b:c:d"
    ));

    let ids: Vec<TaskId> = resolution.tasks.iter().map(|t| t.id().clone()).collect();
    assert_eq!(
        ids,
        vec![
            TaskId::database("crm", "crm"),
            TaskId::table("shop", "shop", "orders"),
            TaskId::table("shop", "shop", "users"),
        ]
    );

    Ok(())
}

#[tokio::test]
async fn failed_discovery_skips_only_that_unit() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new()
        .with_discovery_failure("legacy", "access denied")
        .with_tables("empty", &[])
        .with_tables("shop", &["orders"]);
    let tunables = TunablesBuilder::new().build();
    let resolver = TaskResolver::new(&backend, &tunables, CancellationToken::new());

    let resolution =
        with_timeout(resolver.resolve(&units(&["legacy:*", "empty:*", "shop:*"]))).await;

    assert_eq!(resolution.failure_count(), 2);
    let messages: Vec<String> = resolution.failures.iter().map(|e| e.to_string()).collect();
    assert!(messages[0].contains("access denied"), "{messages:?}");
    assert!(messages[1].contains("no tables"), "{messages:?}");

    assert_eq!(resolution.tasks.len(), 1);
    assert_eq!(resolution.tasks[0].id(), &TaskId::table("shop", "shop", "orders"));

    Ok(())
}

#[tokio::test]
async fn derived_destination_uses_prefix_and_duplicates_collapse() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new();
    let tunables = TunablesBuilder::new().dest_prefix("local_").build();
    let resolver = TaskResolver::new(&backend, &tunables, CancellationToken::new());

    let resolution = with_timeout(resolver.resolve(&units(&[
        "shop:orders",
        "shop:local_shop:orders,users",
        "shop",
    ])))
    .await;

    let ids: Vec<TaskId> = resolution.tasks.iter().map(|t| t.id().clone()).collect();
    assert_eq!(
        ids,
        vec![
            TaskId::table("shop", "local_shop", "orders"),
            TaskId::table("shop", "local_shop", "users"),
            TaskId::database("shop", "local_shop"),
        ]
    );
    assert_eq!(resolution.failure_count(), 0);

    Ok(())
}
