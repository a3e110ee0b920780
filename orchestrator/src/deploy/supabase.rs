//! Supabase provisioning step
//!
//! Creates the remote backend project, links the local artifact, pushes
//! schema migrations and fetches API keys. The CLI exposes no structured
//! error codes over this surface, so outcomes are classified from its text
//! output.

use std::collections::BTreeMap;
use std::path::Path;

use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::OrchestratorConfig;
use crate::deploy::secrets::generate_db_password;
use crate::deploy::{ok_line, warn_line};
use crate::errors::OrchestratorError;
use crate::exec::{CommandSpec, RetryOptions, RetryingExecutor};
use crate::models::deployment::keys;
use crate::store::DeploymentStore;

const CREATE_NON_RETRYABLE: [&str; 3] = ["project limit", "quota", "already exists"];
const PUSH_NON_RETRYABLE: [&str; 2] = ["schema conflict", "permission denied"];

/// Project entry from `supabase projects list -o json`
#[derive(Debug, Deserialize)]
struct ProjectEntry {
    #[serde(alias = "ref")]
    id: String,
    name: String,
    #[serde(default)]
    created_at: String,
}

/// API key entry from `supabase projects api-keys -o json`
#[derive(Debug, Deserialize)]
struct ApiKeyEntry {
    name: String,
    api_key: String,
}

pub struct SupabaseStep<'a> {
    exec: &'a RetryingExecutor,
    store: &'a dyn DeploymentStore,
    config: &'a OrchestratorConfig,
}

impl<'a> SupabaseStep<'a> {
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

    fn base_spec(&self) -> CommandSpec {
        CommandSpec::new("supabase")
            .env(
                "SUPABASE_ACCESS_TOKEN",
                self.config.supabase.access_token.expose_secret(),
            )
            .timeout(self.config.command_timeout)
    }

    fn retry_options(&self, step_name: &str, deployment_id: &str) -> RetryOptions {
        RetryOptions::new(step_name, deployment_id)
            .with_budget(self.config.retry.max_retries, self.config.retry.backoff_base)
    }

    /// Run the step, returning the provider_state entries it produced
    pub async fn run(
        &self,
        deployment_id: &str,
        slug: &str,
        build_dir: &Path,
    ) -> Result<BTreeMap<String, String>, OrchestratorError> {
        info!(deployment_id, slug, "Starting Supabase step");

        // Fresh password per attempt; a skipped step keeps the persisted one
        let db_password = generate_db_password();

        let create = self
            .base_spec()
            .args(["projects", "create", slug])
            .args(["--org-id", &self.config.supabase.org_id])
            .args(["--region", &self.config.supabase.region])
            .arg("--db-password")
            .secret_arg(&db_password);

        let options = self
            .retry_options("supabase project create", deployment_id)
            .with_patterns(CREATE_NON_RETRYABLE);

        let out = self.exec.run_with_retry(&create, &options).await?;
        if !out.succeeded {
            return Err(OrchestratorError::DeployError(format!(
                "supabase project creation failed: {}",
                out.output
            )));
        }

        let project_ref = match self.resolve_project_ref(deployment_id, slug, &out.output).await? {
            Some(project_ref) => project_ref,
            None => {
                // Unresolvable reference is a hard stop for the whole
                // pipeline, not just this step
                return Err(OrchestratorError::DeployError(
                    "could not determine supabase project reference".to_string(),
                ));
            }
        };

        self.store
            .append_log(
                deployment_id,
                &ok_line(format!("Supabase project created: {}", project_ref)),
            )
            .await?;

        // Linking is best-effort; migrations run against the remote ref
        let link = self
            .base_spec()
            .args(["link", "--project-ref", &project_ref])
            .cwd(build_dir);
        let out = self
            .exec
            .run_with_retry(
                &link,
                &RetryOptions::new("supabase link", deployment_id).with_budget(1, 2.0),
            )
            .await?;
        if !out.succeeded {
            warn!(deployment_id, "supabase link failed (non-fatal)");
            self.store
                .append_log(deployment_id, &warn_line("Supabase link failed (non-fatal)"))
                .await?;
        }

        let push = self
            .base_spec()
            .args(["db", "push"])
            .arg("--password")
            .secret_arg(&db_password)
            .cwd(build_dir);

        let options = self
            .retry_options("supabase db push", deployment_id)
            .with_patterns(PUSH_NON_RETRYABLE);

        let out = self.exec.run_with_retry(&push, &options).await?;
        if !out.succeeded {
            return Err(OrchestratorError::DeployError(format!(
                "schema migration failed: {}",
                out.output
            )));
        }

        self.store
            .append_log(deployment_id, &ok_line("Schema migrations applied"))
            .await?;

        let (anon_key, service_key) = self.fetch_api_keys(deployment_id, &project_ref).await?;

        let mut artifacts = BTreeMap::new();
        artifacts.insert(
            keys::SUPABASE_URL.to_string(),
            format!("https://{}.supabase.co", project_ref),
        );
        artifacts.insert(keys::SUPABASE_PROJECT_REF.to_string(), project_ref);
        artifacts.insert(keys::ANON_KEY.to_string(), anon_key);
        artifacts.insert(keys::SERVICE_KEY.to_string(), service_key);
        artifacts.insert(keys::DB_PASSWORD.to_string(), db_password);
        Ok(artifacts)
    }

    /// Resolve the created project's reference identifier.
    ///
    /// Primary path parses the creation output; the fallback re-lists all
    /// projects and matches by name, taking the most recently created entry.
    /// The fallback can pick the wrong project when concurrent deployments
    /// in the same organization share a name; the creation-output path is
    /// always preferred for that reason.
    async fn resolve_project_ref(
        &self,
        deployment_id: &str,
        slug: &str,
        create_output: &str,
    ) -> Result<Option<String>, OrchestratorError> {
        if let Some(project_ref) = parse_project_ref(create_output) {
            return Ok(Some(project_ref));
        }

        warn!(deployment_id, "project ref missing from create output, listing projects");

        let list = self.base_spec().args(["projects", "list", "--output", "json"]);
        let out = self
            .exec
            .run_with_retry(
                &list,
                &RetryOptions::new("supabase projects list", deployment_id).with_budget(1, 2.0),
            )
            .await?;
        if !out.succeeded {
            return Ok(None);
        }

        let entries: Vec<ProjectEntry> = match serde_json::from_str(&out.output) {
            Ok(entries) => entries,
            Err(_) => return Ok(None),
        };

        Ok(entries
            .into_iter()
            .filter(|e| e.name == slug)
            .max_by(|a, b| a.created_at.cmp(&b.created_at))
            .map(|e| e.id))
    }

    /// Best-effort API key fetch; a parse failure leaves the keys blank and
    /// the Vercel step simply skips the matching environment variables
    async fn fetch_api_keys(
        &self,
        deployment_id: &str,
        project_ref: &str,
    ) -> Result<(String, String), OrchestratorError> {
        let fetch = self.base_spec().args([
            "projects",
            "api-keys",
            "--project-ref",
            project_ref,
            "--output",
            "json",
        ]);
        let out = self
            .exec
            .run_with_retry(
                &fetch,
                &RetryOptions::new("supabase api-keys", deployment_id).with_budget(1, 2.0),
            )
            .await?;

        let mut anon_key = String::new();
        let mut service_key = String::new();

        if out.succeeded {
            if let Ok(entries) = serde_json::from_str::<Vec<ApiKeyEntry>>(&out.output) {
                for entry in entries {
                    match entry.name.as_str() {
                        "anon" => anon_key = entry.api_key,
                        "service_role" => service_key = entry.api_key,
                        _ => {}
                    }
                }
            }
        }

        if anon_key.is_empty() || service_key.is_empty() {
            warn!(deployment_id, "could not parse supabase api keys");
            self.store
                .append_log(
                    deployment_id,
                    &warn_line("Could not fetch Supabase API keys (non-fatal)"),
                )
                .await?;
        }

        Ok((anon_key, service_key))
    }
}

/// Scan command output for a 20-character lowercase alphanumeric project ref
fn parse_project_ref(output: &str) -> Option<String> {
    output
        .split(|c: char| !c.is_ascii_alphanumeric())
        .find(|token| {
            token.len() == 20
                && token
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
                && token.chars().any(|c| c.is_ascii_lowercase())
        })
        .map(|token| token.to_string())
}
