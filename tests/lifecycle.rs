// ABOUTME: Integration tests for container retirement against the in-memory engine.
// ABOUTME: Retirement is idempotent; only a failed removal is an error.

use std::time::Duration;

use shipit::deploy::{DeployError, RetireOutcome, retire_existing};
use shipit::runtime::{ContainerState, MemoryRuntime, RecordedOp};
use shipit::types::ImageRef;

const TIMEOUT: Duration = Duration::from_secs(1);

fn image() -> ImageRef {
    ImageRef::parse("optitrade:latest").unwrap()
}

#[tokio::test]
async fn absent_container_is_already_absent() {
    let rt = MemoryRuntime::new();

    let outcome = retire_existing(&rt, "optitrade", TIMEOUT).await;

    assert_eq!(outcome, RetireOutcome::AlreadyAbsent);
    assert!(outcome.into_result("optitrade").unwrap().is_none());
    assert!(rt.ops().is_empty());
}

#[tokio::test]
async fn running_container_is_stopped_then_removed() {
    let rt = MemoryRuntime::new();
    let id = rt.seed_container("optitrade", &image(), true);

    let outcome = retire_existing(&rt, "optitrade", TIMEOUT).await;

    assert_eq!(outcome, RetireOutcome::Removed(id));
    assert_eq!(
        rt.ops(),
        vec![
            RecordedOp::Stop { name: "optitrade".to_string() },
            RecordedOp::Remove { name: "optitrade".to_string() },
        ]
    );
    assert!(rt.container_names().is_empty());
}

#[tokio::test]
async fn stopped_container_is_removed_without_stop() {
    let rt = MemoryRuntime::new();
    rt.seed_container("optitrade", &image(), false);

    let outcome = retire_existing(&rt, "optitrade", TIMEOUT).await;

    assert!(matches!(outcome, RetireOutcome::Removed(_)));
    assert_eq!(
        rt.ops(),
        vec![RecordedOp::Remove { name: "optitrade".to_string() }]
    );
}

#[tokio::test]
async fn retiring_twice_is_idempotent() {
    let rt = MemoryRuntime::new();
    rt.seed_container("optitrade", &image(), true);

    retire_existing(&rt, "optitrade", TIMEOUT).await;
    let second = retire_existing(&rt, "optitrade", TIMEOUT).await;

    assert_eq!(second, RetireOutcome::AlreadyAbsent);
}

#[tokio::test]
async fn failed_removal_is_an_error() {
    let rt = MemoryRuntime::new();
    rt.seed_container("optitrade", &image(), true);
    rt.fail_remove("optitrade");

    let outcome = retire_existing(&rt, "optitrade", TIMEOUT).await;

    assert!(matches!(outcome, RetireOutcome::RemovalFailed(_)));
    assert!(matches!(
        outcome.into_result("optitrade"),
        Err(DeployError::RetireFailed { name, .. }) if name == "optitrade"
    ));
}

#[tokio::test]
async fn name_matching_another_containers_id_leaves_it_alone() {
    let rt = MemoryRuntime::new();
    let db = rt.seed_container("unrelated-db", &image(), true);

    for name in [db.as_str(), &db.as_str()[..12]] {
        let outcome = retire_existing(&rt, name, TIMEOUT).await;
        assert_eq!(outcome, RetireOutcome::AlreadyAbsent);
    }

    assert_eq!(rt.container_names(), vec!["unrelated-db"]);
    assert_eq!(rt.container_state("unrelated-db"), Some(ContainerState::Running));
    assert!(rt.ops().is_empty());
}

#[tokio::test]
async fn exact_name_wins_over_id_prefix() {
    let rt = MemoryRuntime::new();
    let db = rt.seed_container("unrelated-db", &image(), true);
    let prefix = db.as_str()[..12].to_string();
    rt.seed_container(&prefix, &image(), false);

    let outcome = retire_existing(&rt, &prefix, TIMEOUT).await;

    assert!(matches!(outcome, RetireOutcome::Removed(_)));
    assert_eq!(rt.container_names(), vec!["unrelated-db"]);
}
