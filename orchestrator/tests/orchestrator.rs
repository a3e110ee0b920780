//! End-to-end pipeline runs against scripted providers

mod common;

use std::path::Path;
use std::sync::Arc;

use shipwright::config::OrchestratorConfig;
use shipwright::deploy::{DeployRequest, Orchestrator};
use shipwright::errors::OrchestratorError;
use shipwright::models::deployment::{keys, DeployStatus, HealthStatus};
use shipwright::store::{DeploymentStore, MemoryStore};

use common::{no_sleep, ScriptedRunner, StubProbe, API_KEYS_JSON, PROJECT_REF};

fn config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.github.org = "acme".to_string();
    config.supabase.org_id = "org-1".to_string();
    config.supabase.region = "us-east-1".to_string();
    config
}

/// Runner scripted for a clean three-step run
fn happy_runner() -> ScriptedRunner {
    ScriptedRunner::new()
        .with_rule(
            "projects create",
            vec![(
                true,
                "Created a new project at https://supabase.com/dashboard/project/abcdefghijklmnopqrst",
            )],
        )
        .with_rule("api-keys", vec![(true, API_KEYS_JSON)])
        .with_rule(
            "deploy --prod",
            vec![(true, "Production: https://my-app.vercel.app")],
        )
}

fn request(build_dir: &Path) -> DeployRequest {
    DeployRequest {
        deployment_id: "d-1".to_string(),
        project_id: "p-1".to_string(),
        project_name: "My App".to_string(),
        build_artifact_path: build_dir.to_path_buf(),
    }
}

fn orchestrator(
    runner: Arc<ScriptedRunner>,
    store: Arc<MemoryStore>,
    probe: Arc<StubProbe>,
) -> Orchestrator {
    Orchestrator::new(config(), store, runner, probe).with_sleep_fn(no_sleep())
}

#[tokio::test]
async fn happy_path_provisions_all_three_providers() {
    let build_dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(happy_runner());
    let store = Arc::new(MemoryStore::new());
    let probe = Arc::new(StubProbe::new(vec![200]));

    orchestrator(runner.clone(), store.clone(), probe.clone())
        .deploy(request(build_dir.path()))
        .await
        .unwrap();

    let deployment = store.load("d-1").await.unwrap();
    assert_eq!(deployment.status, DeployStatus::Live);
    assert_eq!(
        deployment.deploy_url.as_deref(),
        Some("https://my-app.vercel.app")
    );
    assert_eq!(deployment.health_check_status, HealthStatus::Healthy);

    assert_eq!(
        deployment.provider_value(keys::GITHUB_URL),
        Some("https://github.com/acme/my-app")
    );
    assert_eq!(
        deployment.provider_value(keys::SUPABASE_PROJECT_REF),
        Some(PROJECT_REF)
    );
    assert_eq!(
        deployment.provider_value(keys::SUPABASE_URL),
        Some("https://abcdefghijklmnopqrst.supabase.co")
    );
    assert_eq!(deployment.provider_value(keys::ANON_KEY), Some("anon-key-1234"));
    assert!(deployment.provider_value(keys::DB_PASSWORD).is_some());

    assert!(deployment
        .deploy_log
        .iter()
        .any(|l| l.contains("Deployment complete: https://my-app.vercel.app")));

    // Backend credentials are handed to the hosting project as env vars
    assert_eq!(runner.count_calls("env add NEXT_PUBLIC_SUPABASE_URL"), 1);
    assert_eq!(runner.count_calls("env add NEXT_PUBLIC_SUPABASE_ANON_KEY"), 1);
    assert_eq!(runner.count_calls("env add SUPABASE_SERVICE_ROLE_KEY"), 1);

    let project = store.get_project("p-1").await.unwrap().unwrap();
    assert_eq!(project.live_url.as_deref(), Some("https://my-app.vercel.app"));
}

#[tokio::test]
async fn migration_failure_halts_the_pipeline() {
    let build_dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(
        happy_runner().with_rule("db push", vec![(false, "ERROR: schema conflict detected")]),
    );
    let store = Arc::new(MemoryStore::new());
    let probe = Arc::new(StubProbe::new(vec![200]));

    orchestrator(runner.clone(), store.clone(), probe)
        .deploy(request(build_dir.path()))
        .await
        .unwrap();

    let deployment = store.load("d-1").await.unwrap();
    assert_eq!(deployment.status, DeployStatus::Failed);
    assert!(deployment.deploy_url.is_none());

    // No later step ran
    assert_eq!(runner.count_calls("vercel"), 0);

    assert!(deployment
        .deploy_log
        .iter()
        .any(|l| l.contains("non-retryable error (schema conflict)")));
    assert!(deployment
        .deploy_log
        .iter()
        .any(|l| l == "✗ Deployment failed during Supabase step"));
}

#[tokio::test]
async fn resume_skips_completed_steps_and_keeps_artifacts() {
    let build_dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(happy_runner().with_rule(
        "deploy --prod",
        vec![
            (false, "Error: Invalid token"),
            (true, "Production: https://my-app.vercel.app"),
        ],
    ));
    let store = Arc::new(MemoryStore::new());
    let probe = Arc::new(StubProbe::new(vec![200]));
    let orchestrator = orchestrator(runner.clone(), store.clone(), probe);

    orchestrator.deploy(request(build_dir.path())).await.unwrap();

    let deployment = store.load("d-1").await.unwrap();
    assert_eq!(deployment.status, DeployStatus::Failed);
    let github_url = deployment.provider_value(keys::GITHUB_URL).unwrap().to_string();
    let db_password = deployment.provider_value(keys::DB_PASSWORD).unwrap().to_string();

    orchestrator.deploy(request(build_dir.path())).await.unwrap();

    let deployment = store.load("d-1").await.unwrap();
    assert_eq!(deployment.status, DeployStatus::Live);
    assert_eq!(
        deployment.deploy_url.as_deref(),
        Some("https://my-app.vercel.app")
    );

    // Each completed provider was provisioned exactly once across both runs
    assert_eq!(runner.count_calls("gh repo create"), 1);
    assert_eq!(runner.count_calls("projects create"), 1);
    assert_eq!(runner.count_calls("db push"), 1);
    assert_eq!(runner.count_calls("deploy --prod"), 2);

    // Artifacts from the first run survive unchanged
    assert_eq!(deployment.provider_value(keys::GITHUB_URL), Some(github_url.as_str()));
    assert_eq!(
        deployment.provider_value(keys::DB_PASSWORD),
        Some(db_password.as_str())
    );

    let log = &deployment.deploy_log;
    assert!(log.iter().any(|l| l.contains("Resuming deployment after failure")));
    assert!(log.iter().any(|l| l.contains("GitHub step already complete, skipping")));
    assert!(log.iter().any(|l| l.contains("Supabase step already complete, skipping")));
}

#[tokio::test]
async fn live_deployment_is_a_no_op() {
    let build_dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(happy_runner());
    let store = Arc::new(MemoryStore::new());
    let probe = Arc::new(StubProbe::new(vec![200]));
    let orchestrator = orchestrator(runner.clone(), store.clone(), probe);

    orchestrator.deploy(request(build_dir.path())).await.unwrap();
    let calls_after_first = runner.calls().len();
    let log_after_first = store.load("d-1").await.unwrap().deploy_log.len();

    orchestrator.deploy(request(build_dir.path())).await.unwrap();

    assert_eq!(runner.calls().len(), calls_after_first);
    assert_eq!(store.load("d-1").await.unwrap().deploy_log.len(), log_after_first);
}

#[tokio::test]
async fn secrets_never_reach_the_deploy_log() {
    let build_dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(happy_runner());
    let store = Arc::new(MemoryStore::new());
    let probe = Arc::new(StubProbe::new(vec![200]));

    orchestrator(runner.clone(), store.clone(), probe)
        .deploy(request(build_dir.path()))
        .await
        .unwrap();

    let calls = runner.calls();
    let push = calls
        .iter()
        .find(|spec| spec.display().contains("db push"))
        .unwrap();
    let password_idx = push.args.iter().position(|a| a == "--password").unwrap() + 1;
    let db_password = push.args[password_idx].clone();

    // The raw invocation carries the password, its displayed form does not
    assert!(push.display().contains("--password ****"));
    assert!(!push.display().contains(&db_password));

    let deployment = store.load("d-1").await.unwrap();
    for line in &deployment.deploy_log {
        assert!(!line.contains(&db_password), "password leaked: {}", line);
        assert!(
            !line.contains("service-role-key-5678"),
            "service key leaked: {}",
            line
        );
    }

    // Env var values travel over stdin, never argv
    let service_env = calls
        .iter()
        .find(|spec| spec.display().contains("env add SUPABASE_SERVICE_ROLE_KEY"))
        .unwrap();
    assert_eq!(service_env.stdin.as_deref(), Some("service-role-key-5678"));
    assert!(!service_env.args.iter().any(|a| a == "service-role-key-5678"));
}

#[tokio::test]
async fn supabase_link_failure_is_non_fatal() {
    let build_dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(
        happy_runner().with_rule("link --project-ref", vec![(false, "connection refused")]),
    );
    let store = Arc::new(MemoryStore::new());
    let probe = Arc::new(StubProbe::new(vec![200]));

    orchestrator(runner.clone(), store.clone(), probe)
        .deploy(request(build_dir.path()))
        .await
        .unwrap();

    let deployment = store.load("d-1").await.unwrap();
    assert_eq!(deployment.status, DeployStatus::Live);
    assert!(deployment
        .deploy_log
        .iter()
        .any(|l| l.contains("Supabase link failed (non-fatal)")));
}

#[tokio::test]
async fn unresolvable_project_name_is_rejected() {
    let build_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let orchestrator = orchestrator(
        Arc::new(happy_runner()),
        store.clone(),
        Arc::new(StubProbe::new(vec![200])),
    );

    let mut request = request(build_dir.path());
    request.project_name = "!!!".to_string();

    let err = orchestrator.deploy(request).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::ConfigError(_)));
    assert!(store.load("d-1").await.is_err());
}
