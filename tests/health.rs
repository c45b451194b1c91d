// ABOUTME: Health polling boundaries against scripted endpoints.
// ABOUTME: Success on any attempt up to the limit, single-attempt budgets and exhaustion.

mod support;

use std::time::Duration;

use proptest::prelude::*;
use shipit::config::HealthSettings;
use shipit::deploy::{ContainerHandle, HealthStatus, await_healthy};
use shipit::runtime::MemoryRuntime;
use shipit::types::ImageRef;
use support::ScriptedHealth;

fn settings(max_attempts: u32) -> HealthSettings {
    HealthSettings {
        settle_delay: Duration::ZERO,
        interval: Duration::ZERO,
        max_attempts,
        probe_timeout: Duration::from_secs(1),
        ..HealthSettings::default()
    }
}

fn running_instance(rt: &MemoryRuntime) -> ContainerHandle {
    let image = ImageRef::parse("optitrade:latest").unwrap();
    let id = rt.seed_container("optitrade", &image, true);
    rt.set_logs("optitrade", &["ModuleNotFoundError: No module named 'crewai'"]);
    ContainerHandle {
        name: "optitrade".to_string(),
        id,
    }
}

#[tokio::test]
async fn healthy_on_the_last_allowed_attempt() {
    let rt = MemoryRuntime::new();
    let handle = running_instance(&rt);
    let health = ScriptedHealth::healthy_on(5);

    let report = await_healthy(&rt, &handle, &health, &settings(5)).await;

    assert_eq!(report.status, HealthStatus::Healthy);
    assert_eq!(report.attempts, 5);
    assert_eq!(health.calls(), 5);
    assert!(report.logs.is_empty());
}

#[tokio::test]
async fn single_attempt_budget_succeeds_immediately() {
    let rt = MemoryRuntime::new();
    let handle = running_instance(&rt);
    let health = ScriptedHealth::healthy();

    let report = await_healthy(&rt, &handle, &health, &settings(1)).await;

    assert_eq!(report.status, HealthStatus::Healthy);
    assert_eq!(report.attempts, 1);
    assert_eq!(health.calls(), 1);
}

#[tokio::test]
async fn single_attempt_budget_exhausts_after_one_call() {
    let rt = MemoryRuntime::new();
    let handle = running_instance(&rt);
    let health = ScriptedHealth::never();

    let report = await_healthy(&rt, &handle, &health, &settings(1)).await;

    assert_eq!(report.status, HealthStatus::UnhealthyExhausted);
    assert_eq!(report.attempts, 1);
    assert_eq!(health.calls(), 1);
    assert_eq!(report.last_error.as_deref(), Some("HTTP 503"));
    assert_eq!(
        report.logs,
        vec!["ModuleNotFoundError: No module named 'crewai'".to_string()]
    );
}

#[tokio::test]
async fn one_success_past_the_budget_is_still_exhausted() {
    let rt = MemoryRuntime::new();
    let handle = running_instance(&rt);
    let health = ScriptedHealth::healthy_on(4);

    let report = await_healthy(&rt, &handle, &health, &settings(3)).await;

    assert_eq!(report.status, HealthStatus::UnhealthyExhausted);
    assert_eq!(health.calls(), 3);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn healthy_on_attempt_k_stops_after_k_calls(
        (max_attempts, k) in (1u32..=12).prop_flat_map(|max| (Just(max), 1u32..=max)),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let rt = MemoryRuntime::new();
        let handle = running_instance(&rt);
        let health = ScriptedHealth::healthy_on(k as usize);

        let report = runtime.block_on(await_healthy(&rt, &handle, &health, &settings(max_attempts)));

        prop_assert_eq!(report.status, HealthStatus::Healthy);
        prop_assert_eq!(report.attempts, k);
        prop_assert_eq!(health.calls(), k);
    }
}
