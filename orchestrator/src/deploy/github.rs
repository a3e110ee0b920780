//! GitHub provisioning step
//!
//! Commits the build artifact to a fresh local repository and pushes it to a
//! new private remote under the configured organization.

use std::collections::BTreeMap;
use std::path::Path;

use secrecy::ExposeSecret;
use tracing::info;

use crate::config::OrchestratorConfig;
use crate::deploy::ok_line;
use crate::errors::OrchestratorError;
use crate::exec::{CommandSpec, RetryOptions, RetryingExecutor};
use crate::models::deployment::keys;
use crate::store::DeploymentStore;

/// Scaffold-internal and secret files excluded from the committed artifact
const GITIGNORE: &str = "\
node_modules/
dist/
.next/
.env
.env.*
.vercel/
.supabase/
.scaffold/
*.log
.DS_Store
";

/// Patterns marking a repository creation failure as permanent
const NON_RETRYABLE: [&str; 2] = ["name already exists", "authentication"];

pub struct GithubStep<'a> {
    exec: &'a RetryingExecutor,
    store: &'a dyn DeploymentStore,
    config: &'a OrchestratorConfig,
}

impl<'a> GithubStep<'a> {
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

    /// Run the step, returning the provider_state entries it produced
    pub async fn run(
        &self,
        deployment_id: &str,
        slug: &str,
        build_dir: &Path,
    ) -> Result<BTreeMap<String, String>, OrchestratorError> {
        info!(deployment_id, slug, "Starting GitHub step");

        tokio::fs::write(build_dir.join(".gitignore"), GITIGNORE).await?;

        // Local repository setup is a single bounded attempt per command
        for (desc, args) in [
            ("git init", vec!["init"]),
            ("git add", vec!["add", "-A"]),
            (
                "git commit",
                vec![
                    "-c",
                    "user.name=Shipwright",
                    "-c",
                    "user.email=deploy@shipwright.dev",
                    "commit",
                    "-m",
                    "Initial deployment",
                ],
            ),
        ] {
            let spec = CommandSpec::new("git")
                .args(args)
                .cwd(build_dir)
                .timeout(self.config.command_timeout);
            let out = self
                .exec
                .run_with_retry(
                    &spec,
                    &RetryOptions::new(desc, deployment_id).with_budget(1, 2.0),
                )
                .await?;
            if !out.succeeded {
                return Err(OrchestratorError::DeployError(format!(
                    "{} failed: {}",
                    desc, out.output
                )));
            }
        }

        self.store
            .append_log(deployment_id, &ok_line("Build artifact committed"))
            .await?;

        let repo = format!("{}/{}", self.config.github.org, slug);
        let create = CommandSpec::new("gh")
            .args(["repo", "create", &repo, "--private", "--source", ".", "--push"])
            .cwd(build_dir)
            .env("GH_TOKEN", self.config.github.token.expose_secret())
            .timeout(self.config.command_timeout);

        let options = RetryOptions::new("gh repo create", deployment_id)
            .with_budget(self.config.retry.max_retries, self.config.retry.backoff_base)
            .with_patterns(NON_RETRYABLE);

        let out = self.exec.run_with_retry(&create, &options).await?;
        if !out.succeeded {
            return Err(OrchestratorError::DeployError(format!(
                "repository creation failed: {}",
                out.output
            )));
        }

        let github_url = format!("https://github.com/{}", repo);
        self.store
            .append_log(
                deployment_id,
                &ok_line(format!("GitHub repository created: {}", github_url)),
            )
            .await?;

        let mut artifacts = BTreeMap::new();
        artifacts.insert(keys::GITHUB_URL.to_string(), github_url);
        Ok(artifacts)
    }
}
