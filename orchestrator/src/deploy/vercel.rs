//! Vercel provisioning step
//!
//! Links the hosting project, sets production environment variables (values
//! piped over stdin, never argv) and triggers the production deployment.
//! This step is always re-attempted on resume; every operation here is
//! idempotent on the provider side.

use std::collections::BTreeMap;
use std::path::Path;

use secrecy::ExposeSecret;
use tracing::{info, warn};
use url::Url;

use crate::config::OrchestratorConfig;
use crate::deploy::{ok_line, warn_line};
use crate::errors::OrchestratorError;
use crate::exec::{CommandSpec, RetryOptions, RetryingExecutor};
use crate::models::deployment::keys;
use crate::store::DeploymentStore;

const DEPLOY_NON_RETRYABLE: [&str; 2] = ["invalid token", "project not found"];

pub struct VercelStep<'a> {
    exec: &'a RetryingExecutor,
    store: &'a dyn DeploymentStore,
    config: &'a OrchestratorConfig,
}

impl<'a> VercelStep<'a> {
    pub fn new(
        exec: &'a RetryingExecutor,
        store: &'a dyn DeploymentStore,
        config: &'a OrchestratorConfig,
    ) -> Self {
        Self {
            exec,
            store,
            config,
        }
    }

    fn base_spec(&self, build_dir: &Path) -> CommandSpec {
        let spec = CommandSpec::new("vercel")
            .env("VERCEL_TOKEN", self.config.vercel.token.expose_secret())
            .cwd(build_dir)
            .timeout(self.config.command_timeout);

        match &self.config.vercel.scope {
            Some(scope) => spec.args(["--scope", scope]),
            None => spec,
        }
    }

    /// The production deploy invocation, also re-used by the health check
    /// loop for redeploys
    pub fn deploy_spec(&self, build_dir: &Path) -> CommandSpec {
        self.base_spec(build_dir).args(["deploy", "--prod", "--yes"])
    }

    /// Run the step, returning the provider_state entries it produced
    pub async fn run(
        &self,
        deployment_id: &str,
        slug: &str,
        build_dir: &Path,
        env_vars: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>, OrchestratorError> {
        info!(deployment_id, slug, "Starting Vercel step");

        let link = self
            .base_spec(build_dir)
            .args(["link", "--yes", "--project", slug]);
        let out = self
            .exec
            .run_with_retry(
                &link,
                &RetryOptions::new("vercel link", deployment_id).with_budget(1, 2.0),
            )
            .await?;
        if !out.succeeded {
            return Err(OrchestratorError::DeployError(format!(
                "vercel link failed: {}",
                out.output
            )));
        }

        for (name, value) in env_vars {
            // Value over stdin so it never shows up in process listings
            let add = self
                .base_spec(build_dir)
                .args(["env", "add", name, "production", "--yes"])
                .stdin(value.clone());
            let out = self
                .exec
                .run_with_retry(
                    &add,
                    &RetryOptions::new("vercel env add", deployment_id).with_budget(1, 2.0),
                )
                .await?;
            if !out.succeeded {
                warn!(deployment_id, var = %name, "vercel env add failed (non-fatal)");
                self.store
                    .append_log(
                        deployment_id,
                        &warn_line(format!("Could not set {} (non-fatal)", name)),
                    )
                    .await?;
            }
        }

        if !env_vars.is_empty() {
            self.store
                .append_log(deployment_id, &ok_line("Production environment configured"))
                .await?;
        }

        let options = RetryOptions::new("vercel deploy", deployment_id)
            .with_budget(self.config.retry.max_retries, self.config.retry.backoff_base)
            .with_patterns(DEPLOY_NON_RETRYABLE);

        let out = self
            .exec
            .run_with_retry(&self.deploy_spec(build_dir), &options)
            .await?;
        if !out.succeeded {
            return Err(OrchestratorError::DeployError(format!(
                "vercel deploy failed: {}",
                out.output
            )));
        }

        let vercel_url =
            parse_deploy_url(&out.output).unwrap_or_else(|| format!("https://{}.vercel.app", slug));

        self.store
            .append_log(
                deployment_id,
                &ok_line(format!("Production deployment created: {}", vercel_url)),
            )
            .await?;

        let mut artifacts = BTreeMap::new();
        artifacts.insert(keys::VERCEL_URL.to_string(), vercel_url);
        Ok(artifacts)
    }
}

/// Pull the deployment URL out of the CLI output
fn parse_deploy_url(output: &str) -> Option<String> {
    output
        .split_whitespace()
        .map(|token| token.trim_end_matches(['.', ',']))
        .find(|token| {
            Url::parse(token).is_ok_and(|url| {
                url.scheme() == "https"
                    && url.host_str().is_some_and(|host| host.ends_with(".vercel.app"))
            })
        })
        .map(|token| token.to_string())
}
