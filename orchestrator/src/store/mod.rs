//! Deployment record store
//!
//! Every mutation is durable before the orchestrator proceeds to the next
//! logical step; a failed write fails the deployment rather than continuing
//! with unconfirmed state.

pub mod file;
pub mod layout;
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::errors::OrchestratorError;
use crate::models::deployment::{DeployStatus, Deployment, HealthStatus, StepId};
use crate::models::project::Project;

pub use file::FileStore;
pub use layout::StorageLayout;
pub use memory::MemoryStore;

/// Persistence seam for deployment and project records
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Insert a new deployment record
    async fn create(&self, deployment: Deployment) -> Result<(), OrchestratorError>;

    /// Load a deployment record
    async fn load(&self, deployment_id: &str) -> Result<Deployment, OrchestratorError>;

    /// Persist a status transition
    async fn save_status(
        &self,
        deployment_id: &str,
        status: DeployStatus,
    ) -> Result<(), OrchestratorError>;

    /// Append one line to the deploy log
    async fn append_log(&self, deployment_id: &str, line: &str) -> Result<(), OrchestratorError>;

    /// Merge artifacts into provider_state; existing keys are never removed
    /// or overwritten
    async fn merge_provider_state(
        &self,
        deployment_id: &str,
        partial: BTreeMap<String, String>,
    ) -> Result<(), OrchestratorError>;

    /// Record that a provisioning step finished successfully
    async fn mark_step_complete(
        &self,
        deployment_id: &str,
        step: StepId,
    ) -> Result<(), OrchestratorError>;

    /// Set the final public URL
    async fn set_deploy_url(
        &self,
        deployment_id: &str,
        url: &str,
    ) -> Result<(), OrchestratorError>;

    /// Record the outcome of a health probe
    async fn set_health(
        &self,
        deployment_id: &str,
        status: HealthStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<(), OrchestratorError>;

    /// Load the owning project record, if present
    async fn get_project(&self, project_id: &str) -> Result<Option<Project>, OrchestratorError>;

    /// Update (or create) the owning project record with the live URL
    async fn upsert_project_live_url(
        &self,
        project_id: &str,
        name: &str,
        live_url: &str,
    ) -> Result<(), OrchestratorError>;
}

// Shared mutation semantics, applied by every backend under its own lock.

pub(crate) fn apply_status(
    deployment: &mut Deployment,
    status: DeployStatus,
) -> Result<(), OrchestratorError> {
    let allowed = match (deployment.status.rank(), status.rank()) {
        // Failing is always allowed; resuming from failed is the explicit
        // operator-triggered retry path.
        (_, None) | (None, _) => true,
        // Forward walk: skipping is allowed, never reordering.
        (Some(from), Some(to)) => to >= from,
    };

    if !allowed {
        return Err(OrchestratorError::StorageError(format!(
            "illegal status transition: {} -> {}",
            deployment.status, status
        )));
    }

    deployment.status = status;
    deployment.updated_at = Utc::now();
    Ok(())
}

pub(crate) fn apply_log(deployment: &mut Deployment, line: &str) {
    deployment.deploy_log.push(line.to_string());
    deployment.updated_at = Utc::now();
}

pub(crate) fn apply_merge_provider_state(
    deployment: &mut Deployment,
    partial: BTreeMap<String, String>,
) {
    for (key, value) in partial {
        match deployment.provider_state.get(&key) {
            Some(existing) if *existing != value => {
                // Keys are written exactly once by the step that produces
                // them; keep the first value.
                warn!(
                    deployment_id = %deployment.id,
                    key = %key,
                    "ignoring attempt to overwrite provider_state key"
                );
            }
            Some(_) => {}
            None => {
                deployment.provider_state.insert(key, value);
            }
        }
    }
    deployment.updated_at = Utc::now();
}

pub(crate) fn apply_step_complete(deployment: &mut Deployment, step: StepId) {
    deployment.completed_steps.insert(step);
    deployment.updated_at = Utc::now();
}

pub(crate) fn apply_deploy_url(deployment: &mut Deployment, url: &str) {
    deployment.deploy_url = Some(url.to_string());
    deployment.updated_at = Utc::now();
}

pub(crate) fn apply_health(
    deployment: &mut Deployment,
    status: HealthStatus,
    checked_at: DateTime<Utc>,
) {
    deployment.health_check_status = status;
    deployment.last_health_check_at = Some(checked_at);
    deployment.updated_at = Utc::now();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_never_removes_or_overwrites() {
        let mut dep = Deployment::new("d-1", "p-1");

        let mut first = BTreeMap::new();
        first.insert("github_url".to_string(), "https://github.com/a/b".to_string());
        apply_merge_provider_state(&mut dep, first);

        let mut second = BTreeMap::new();
        second.insert("github_url".to_string(), "https://github.com/x/y".to_string());
        second.insert("anon_key".to_string(), "anon".to_string());
        apply_merge_provider_state(&mut dep, second);

        assert_eq!(dep.provider_value("github_url"), Some("https://github.com/a/b"));
        assert_eq!(dep.provider_value("anon_key"), Some("anon"));
        assert_eq!(dep.provider_state.len(), 2);
    }

    #[test]
    fn test_status_walk_is_monotonic() {
        let mut dep = Deployment::new("d-1", "p-1");

        apply_status(&mut dep, DeployStatus::DeployingGithub).unwrap();
        // Skipping ahead is allowed
        apply_status(&mut dep, DeployStatus::DeployingVercel).unwrap();
        // Reordering is not
        assert!(apply_status(&mut dep, DeployStatus::DeployingSupabase).is_err());

        // Failing is always allowed, and resuming from failed is too
        apply_status(&mut dep, DeployStatus::Failed).unwrap();
        apply_status(&mut dep, DeployStatus::DeployingVercel).unwrap();
        apply_status(&mut dep, DeployStatus::Live).unwrap();
    }
}
