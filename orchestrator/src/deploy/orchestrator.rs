//! Step orchestrator
//!
//! Sequences the three provisioning steps for one deployment, decides which
//! steps to skip on resume and drives the overall status transitions. One
//! orchestrator run is a single sequential thread of control per deployment;
//! the caller guarantees at most one active run per deployment ID.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};

use crate::config::OrchestratorConfig;
use crate::deploy::github::GithubStep;
use crate::deploy::health::{HealthChecker, HealthProbe};
use crate::deploy::supabase::SupabaseStep;
use crate::deploy::vercel::VercelStep;
use crate::deploy::{fail_line, ok_line, warn_line};
use crate::errors::OrchestratorError;
use crate::exec::{CommandRunner, RetryingExecutor, SleepFn};
use crate::models::deployment::{keys, DeployStatus, Deployment, StepId};
use crate::store::DeploymentStore;
use crate::utils::slugify;

/// Arguments for one deploy invocation
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub deployment_id: String,
    pub project_id: String,
    pub project_name: String,
    pub build_artifact_path: PathBuf,
}

/// The deployment orchestrator
pub struct Orchestrator {
    config: OrchestratorConfig,
    store: Arc<dyn DeploymentStore>,
    runner: Arc<dyn CommandRunner>,
    probe: Arc<dyn HealthProbe>,
    sleep_fn: SleepFn,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn DeploymentStore>,
        runner: Arc<dyn CommandRunner>,
        probe: Arc<dyn HealthProbe>,
    ) -> Self {
        Self {
            config,
            store,
            runner,
            probe,
            sleep_fn: Arc::new(|wait| Box::pin(tokio::time::sleep(wait))),
        }
    }

    /// Replace the sleep implementation (tests pass a no-op)
    pub fn with_sleep_fn(mut self, sleep_fn: SleepFn) -> Self {
        self.sleep_fn = sleep_fn;
        self
    }

    /// Read API for UI consumption
    pub async fn get_deployment(
        &self,
        deployment_id: &str,
    ) -> Result<Deployment, OrchestratorError> {
        self.store.load(deployment_id).await
    }

    /// Provision the build artifact across all three providers.
    ///
    /// All outcomes are communicated through the record store: a provider
    /// failure records status `failed` and returns `Ok(())`; `Err` is
    /// reserved for store and configuration faults. Re-invoking with the
    /// same deployment ID resumes from the last completed step.
    pub async fn deploy(&self, request: DeployRequest) -> Result<(), OrchestratorError> {
        let id = request.deployment_id.as_str();
        let slug = slugify(&request.project_name);
        if slug.is_empty() {
            return Err(OrchestratorError::ConfigError(format!(
                "project name {:?} produces an empty slug",
                request.project_name
            )));
        }

        let deployment = match self.store.load(id).await {
            Ok(deployment) => deployment,
            Err(OrchestratorError::NotFound(_)) => {
                let deployment = Deployment::new(id, request.project_id.clone());
                self.store.create(deployment.clone()).await?;
                deployment
            }
            Err(e) => return Err(e),
        };

        if deployment.status == DeployStatus::Live {
            info!(deployment_id = id, "Deployment already live, nothing to do");
            return Ok(());
        }
        if deployment.status == DeployStatus::Failed {
            self.store
                .append_log(id, &warn_line("Resuming deployment after failure"))
                .await?;
        }

        info!(deployment_id = id, slug = %slug, "Starting deployment");

        let exec = RetryingExecutor::new(self.runner.clone(), self.store.clone())
            .with_sleep_fn(self.sleep_fn.clone());
        let build_dir = request.build_artifact_path.as_path();

        // Resume decisions: explicit completion markers, with the artifact
        // key each step must have produced as a consistency guard
        let skip_github = deployment.step_complete(StepId::Github, keys::GITHUB_URL);
        let skip_supabase = deployment.step_complete(StepId::Supabase, keys::SUPABASE_PROJECT_REF);

        if skip_github {
            self.store
                .append_log(id, &ok_line("GitHub step already complete, skipping"))
                .await?;
        } else {
            self.store
                .save_status(id, DeployStatus::DeployingGithub)
                .await?;
            let step = GithubStep::new(&exec, self.store.as_ref(), &self.config);
            match step.run(id, &slug, build_dir).await {
                Ok(artifacts) => {
                    self.store.merge_provider_state(id, artifacts).await?;
                    self.store.mark_step_complete(id, StepId::Github).await?;
                }
                Err(e) => return self.fail(id, "GitHub", e).await,
            }
        }

        if skip_supabase {
            self.store
                .append_log(id, &ok_line("Supabase step already complete, skipping"))
                .await?;
        } else {
            self.store
                .save_status(id, DeployStatus::DeployingSupabase)
                .await?;
            let step = SupabaseStep::new(&exec, self.store.as_ref(), &self.config);
            match step.run(id, &slug, build_dir).await {
                Ok(artifacts) => {
                    self.store.merge_provider_state(id, artifacts).await?;
                    self.store.mark_step_complete(id, StepId::Supabase).await?;
                }
                Err(e) => return self.fail(id, "Supabase", e).await,
            }
        }

        // Vercel is never skipped: env and deploy are idempotent on the
        // provider side and a resume must refresh them
        self.store
            .save_status(id, DeployStatus::DeployingVercel)
            .await?;

        let deployment = self.store.load(id).await?;
        let env_vars = collect_env_vars(&deployment);

        let step = VercelStep::new(&exec, self.store.as_ref(), &self.config);
        let artifacts = match step.run(id, &slug, build_dir, &env_vars).await {
            Ok(artifacts) => artifacts,
            Err(e) => return self.fail(id, "Vercel", e).await,
        };

        let vercel_url = artifacts
            .get(keys::VERCEL_URL)
            .cloned()
            .unwrap_or_else(|| format!("https://{}.vercel.app", slug));
        self.store.merge_provider_state(id, artifacts).await?;
        self.store.mark_step_complete(id, StepId::Vercel).await?;
        self.store.set_deploy_url(id, &vercel_url).await?;

        self.finalize(&request, &vercel_url, &exec).await
    }

    /// Mark live, update the owning project and run at least one health check
    async fn finalize(
        &self,
        request: &DeployRequest,
        vercel_url: &str,
        exec: &RetryingExecutor,
    ) -> Result<(), OrchestratorError> {
        let id = request.deployment_id.as_str();

        self.store.save_status(id, DeployStatus::Live).await?;

        let deployment = self.store.load(id).await?;
        let github_url = deployment.provider_value(keys::GITHUB_URL).unwrap_or("-");
        let project_ref = deployment
            .provider_value(keys::SUPABASE_PROJECT_REF)
            .unwrap_or("-");
        self.store
            .append_log(
                id,
                &ok_line(format!(
                    "Deployment complete: {} (repo {}, supabase {})",
                    vercel_url, github_url, project_ref
                )),
            )
            .await?;

        self.store
            .upsert_project_live_url(&request.project_id, &request.project_name, vercel_url)
            .await?;

        info!(deployment_id = id, url = vercel_url, "Deployment live");

        let vercel = VercelStep::new(exec, self.store.as_ref(), &self.config);
        let redeploy = vercel.deploy_spec(request.build_artifact_path.as_path());
        let checker = HealthChecker::new(
            self.probe.as_ref(),
            exec,
            self.store.as_ref(),
            &self.config.health,
            self.sleep_fn.clone(),
        );
        checker.check(id, vercel_url, &redeploy).await?;

        Ok(())
    }

    /// Record a hard-stop pipeline failure; no later step runs
    async fn fail(
        &self,
        deployment_id: &str,
        step: &str,
        err: OrchestratorError,
    ) -> Result<(), OrchestratorError> {
        error!(deployment_id, step, "Deployment failed: {}", err);
        self.store
            .append_log(
                deployment_id,
                &fail_line(format!("Deployment failed during {} step", step)),
            )
            .await?;
        self.store
            .save_status(deployment_id, DeployStatus::Failed)
            .await?;
        Ok(())
    }
}

/// Map non-empty provider artifacts to the production environment variables
/// the hosted app expects; blank values are simply not set
fn collect_env_vars(deployment: &Deployment) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for (key, var) in [
        (keys::SUPABASE_URL, "NEXT_PUBLIC_SUPABASE_URL"),
        (keys::ANON_KEY, "NEXT_PUBLIC_SUPABASE_ANON_KEY"),
        (keys::SERVICE_KEY, "SUPABASE_SERVICE_ROLE_KEY"),
    ] {
        if let Some(value) = deployment.provider_value(key) {
            if !value.is_empty() {
                vars.insert(var.to_string(), value.to_string());
            }
        }
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_env_vars_skips_blank_values() {
        let mut deployment = Deployment::new("d-1", "p-1");
        deployment
            .provider_state
            .insert(keys::SUPABASE_URL.to_string(), "https://ref.supabase.co".to_string());
        deployment
            .provider_state
            .insert(keys::ANON_KEY.to_string(), String::new());

        let vars = collect_env_vars(&deployment);
        assert_eq!(
            vars.get("NEXT_PUBLIC_SUPABASE_URL").map(String::as_str),
            Some("https://ref.supabase.co")
        );
        assert!(!vars.contains_key("NEXT_PUBLIC_SUPABASE_ANON_KEY"));
        assert!(!vars.contains_key("SUPABASE_SERVICE_ROLE_KEY"));
    }
}
