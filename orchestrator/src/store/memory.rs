//! In-memory store backend, used by tests and embeddable callers

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::errors::OrchestratorError;
use crate::models::deployment::{DeployStatus, Deployment, HealthStatus, StepId};
use crate::models::project::Project;

use super::{
    apply_deploy_url, apply_health, apply_log, apply_merge_provider_state, apply_status,
    apply_step_complete, DeploymentStore,
};

/// Mutex-guarded in-memory record store
#[derive(Default)]
pub struct MemoryStore {
    deployments: Mutex<HashMap<String, Deployment>>,
    projects: Mutex<HashMap<String, Project>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    async fn mutate<F>(&self, deployment_id: &str, f: F) -> Result<(), OrchestratorError>
    where
        F: FnOnce(&mut Deployment) -> Result<(), OrchestratorError>,
    {
        let mut deployments = self.deployments.lock().await;
        let deployment = deployments
            .get_mut(deployment_id)
            .ok_or_else(|| OrchestratorError::NotFound(format!("deployment {}", deployment_id)))?;
        f(deployment)
    }
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn create(&self, deployment: Deployment) -> Result<(), OrchestratorError> {
        let mut deployments = self.deployments.lock().await;
        if deployments.contains_key(&deployment.id) {
            return Err(OrchestratorError::StorageError(format!(
                "deployment {} already exists",
                deployment.id
            )));
        }
        deployments.insert(deployment.id.clone(), deployment);
        Ok(())
    }

    async fn load(&self, deployment_id: &str) -> Result<Deployment, OrchestratorError> {
        self.deployments
            .lock()
            .await
            .get(deployment_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound(format!("deployment {}", deployment_id)))
    }

    async fn save_status(
        &self,
        deployment_id: &str,
        status: DeployStatus,
    ) -> Result<(), OrchestratorError> {
        self.mutate(deployment_id, |d| apply_status(d, status)).await
    }

    async fn append_log(&self, deployment_id: &str, line: &str) -> Result<(), OrchestratorError> {
        self.mutate(deployment_id, |d| {
            apply_log(d, line);
            Ok(())
        })
        .await
    }

    async fn merge_provider_state(
        &self,
        deployment_id: &str,
        partial: BTreeMap<String, String>,
    ) -> Result<(), OrchestratorError> {
        self.mutate(deployment_id, |d| {
            apply_merge_provider_state(d, partial);
            Ok(())
        })
        .await
    }

    async fn mark_step_complete(
        &self,
        deployment_id: &str,
        step: StepId,
    ) -> Result<(), OrchestratorError> {
        self.mutate(deployment_id, |d| {
            apply_step_complete(d, step);
            Ok(())
        })
        .await
    }

    async fn set_deploy_url(
        &self,
        deployment_id: &str,
        url: &str,
    ) -> Result<(), OrchestratorError> {
        self.mutate(deployment_id, |d| {
            apply_deploy_url(d, url);
            Ok(())
        })
        .await
    }

    async fn set_health(
        &self,
        deployment_id: &str,
        status: HealthStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<(), OrchestratorError> {
        self.mutate(deployment_id, |d| {
            apply_health(d, status, checked_at);
            Ok(())
        })
        .await
    }

    async fn get_project(&self, project_id: &str) -> Result<Option<Project>, OrchestratorError> {
        Ok(self.projects.lock().await.get(project_id).cloned())
    }

    async fn upsert_project_live_url(
        &self,
        project_id: &str,
        name: &str,
        live_url: &str,
    ) -> Result<(), OrchestratorError> {
        let mut projects = self.projects.lock().await;
        let project = projects
            .entry(project_id.to_string())
            .or_insert_with(|| Project::new(project_id, name));
        project.live_url = Some(live_url.to_string());
        project.updated_at = Utc::now();
        Ok(())
    }
}
