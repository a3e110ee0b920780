//! File-backed store: one JSON document per record
//!
//! Writes go through an atomic temp-file rename with fsync, and a per-ID
//! mutex serializes writers for the same deployment (the single-writer
//! invariant). Distinct deployment IDs never contend.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::errors::OrchestratorError;
use crate::models::deployment::{DeployStatus, Deployment, HealthStatus, StepId};
use crate::models::project::Project;

use super::{
    apply_deploy_url, apply_health, apply_log, apply_merge_provider_state, apply_status,
    apply_step_complete, DeploymentStore, StorageLayout,
};

/// JSON-file record store
pub struct FileStore {
    layout: StorageLayout,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileStore {
    /// Create a store over a storage layout, ensuring its directories exist
    pub async fn open(layout: StorageLayout) -> Result<Self, OrchestratorError> {
        layout.setup().await?;
        Ok(Self {
            layout,
            locks: Mutex::new(HashMap::new()),
        })
    }

    async fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn read_deployment(&self, deployment_id: &str) -> Result<Deployment, OrchestratorError> {
        let file = self.layout.deployment_file(deployment_id);
        if !file.exists().await {
            return Err(OrchestratorError::NotFound(format!(
                "deployment {}",
                deployment_id
            )));
        }
        file.read_json().await
    }

    async fn mutate<F>(&self, deployment_id: &str, f: F) -> Result<(), OrchestratorError>
    where
        F: FnOnce(&mut Deployment) -> Result<(), OrchestratorError>,
    {
        let lock = self.lock_for(deployment_id).await;
        let _guard = lock.lock().await;

        let mut deployment = self.read_deployment(deployment_id).await?;
        f(&mut deployment)?;

        self.layout
            .deployment_file(deployment_id)
            .write_json(&deployment)
            .await
    }
}

#[async_trait]
impl DeploymentStore for FileStore {
    async fn create(&self, deployment: Deployment) -> Result<(), OrchestratorError> {
        let lock = self.lock_for(&deployment.id).await;
        let _guard = lock.lock().await;

        let file = self.layout.deployment_file(&deployment.id);
        if file.exists().await {
            return Err(OrchestratorError::StorageError(format!(
                "deployment {} already exists",
                deployment.id
            )));
        }
        file.write_json(&deployment).await
    }

    async fn load(&self, deployment_id: &str) -> Result<Deployment, OrchestratorError> {
        self.read_deployment(deployment_id).await
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
        let file = self.layout.project_file(project_id);
        if !file.exists().await {
            return Ok(None);
        }
        Ok(Some(file.read_json().await?))
    }

    async fn upsert_project_live_url(
        &self,
        project_id: &str,
        name: &str,
        live_url: &str,
    ) -> Result<(), OrchestratorError> {
        let lock = self.lock_for(&format!("project:{}", project_id)).await;
        let _guard = lock.lock().await;

        let file = self.layout.project_file(project_id);
        let mut project = if file.exists().await {
            file.read_json().await?
        } else {
            Project::new(project_id, name)
        };

        project.live_url = Some(live_url.to_string());
        project.updated_at = Utc::now();
        file.write_json(&project).await
    }
}
