//! Health check and heal loop against stubbed probes and runners

mod common;

use std::sync::Arc;

use shipwright::config::HealthOptions;
use shipwright::deploy::health::HealthChecker;
use shipwright::exec::{CommandSpec, RetryingExecutor};
use shipwright::models::deployment::{DeployStatus, Deployment, HealthStatus};
use shipwright::store::{DeploymentStore, MemoryStore};

use common::{no_sleep, ScriptedRunner, StubProbe};

const URL: &str = "https://my-app.vercel.app";

fn redeploy_spec() -> CommandSpec {
    CommandSpec::new("vercel").args(["deploy", "--prod", "--yes"])
}

async fn live_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.create(Deployment::new("d-1", "p-1")).await.unwrap();
    store.save_status("d-1", DeployStatus::Live).await.unwrap();
    store
}

#[tokio::test]
async fn healthy_on_first_probe_needs_no_redeploy() {
    let runner = Arc::new(ScriptedRunner::new());
    let store = live_store().await;
    let probe = StubProbe::new(vec![200]);
    let exec = RetryingExecutor::new(runner.clone(), store.clone()).with_sleep_fn(no_sleep());
    let options = HealthOptions::default();

    let checker = HealthChecker::new(&probe, &exec, store.as_ref(), &options, no_sleep());
    let verdict = checker.check("d-1", URL, &redeploy_spec()).await.unwrap();

    assert_eq!(verdict, HealthStatus::Healthy);
    assert_eq!(probe.probe_count(), 1);
    assert_eq!(runner.count_calls("deploy --prod"), 0);

    let deployment = store.load("d-1").await.unwrap();
    assert_eq!(deployment.health_check_status, HealthStatus::Healthy);
    assert!(deployment.last_health_check_at.is_some());
    assert!(deployment
        .deploy_log
        .iter()
        .any(|l| l.contains("Health check passed (HTTP 200)")));
}

#[tokio::test]
async fn failing_probe_triggers_redeploy_then_heals() {
    let runner = Arc::new(ScriptedRunner::new());
    let store = live_store().await;
    let probe = StubProbe::new(vec![500, 500, 200]);
    let exec = RetryingExecutor::new(runner.clone(), store.clone()).with_sleep_fn(no_sleep());
    let options = HealthOptions::default();

    let checker = HealthChecker::new(&probe, &exec, store.as_ref(), &options, no_sleep());
    let verdict = checker.check("d-1", URL, &redeploy_spec()).await.unwrap();

    assert_eq!(verdict, HealthStatus::Healthy);
    assert_eq!(probe.probe_count(), 3);
    assert_eq!(runner.count_calls("deploy --prod"), 2);

    let deployment = store.load("d-1").await.unwrap();
    assert_eq!(deployment.health_check_status, HealthStatus::Healthy);
    assert!(deployment
        .deploy_log
        .iter()
        .any(|l| l.contains("Health check failed (HTTP 500), redeploying (1/2)")));
    assert!(deployment
        .deploy_log
        .iter()
        .any(|l| l.contains("Health check failed (HTTP 500), redeploying (2/2)")));
}

#[tokio::test]
async fn exhausted_redeploys_degrade_without_failing_the_deployment() {
    let runner = Arc::new(ScriptedRunner::new());
    let store = live_store().await;
    let probe = StubProbe::new(vec![503]);
    let exec = RetryingExecutor::new(runner.clone(), store.clone()).with_sleep_fn(no_sleep());
    let options = HealthOptions::default();

    let checker = HealthChecker::new(&probe, &exec, store.as_ref(), &options, no_sleep());
    let verdict = checker.check("d-1", URL, &redeploy_spec()).await.unwrap();

    assert_eq!(verdict, HealthStatus::Unhealthy);
    assert_eq!(probe.probe_count(), 3);
    assert_eq!(runner.count_calls("deploy --prod"), 2);

    let deployment = store.load("d-1").await.unwrap();
    // The deployment stays live; unhealthy is a degradation, not a failure
    assert_eq!(deployment.status, DeployStatus::Live);
    assert_eq!(deployment.health_check_status, HealthStatus::Unhealthy);
    assert!(deployment
        .deploy_log
        .iter()
        .any(|l| l.contains("needs manual inspection")));
}

#[tokio::test]
async fn network_error_counts_as_a_failing_probe() {
    let runner = Arc::new(ScriptedRunner::new());
    let store = live_store().await;
    // 0 is the probe's marker for a request that never completed
    let probe = StubProbe::new(vec![0, 200]);
    let exec = RetryingExecutor::new(runner.clone(), store.clone()).with_sleep_fn(no_sleep());
    let options = HealthOptions::default();

    let checker = HealthChecker::new(&probe, &exec, store.as_ref(), &options, no_sleep());
    let verdict = checker.check("d-1", URL, &redeploy_spec()).await.unwrap();

    assert_eq!(verdict, HealthStatus::Healthy);
    assert_eq!(runner.count_calls("deploy --prod"), 1);
}
