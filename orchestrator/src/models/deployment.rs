//! Deployment record model

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Keys written into `provider_state` by the provisioning steps.
///
/// Each key is written exactly once, by the step that produces it; later
/// steps and the resume logic only ever read it.
pub mod keys {
    pub const GITHUB_URL: &str = "github_url";
    pub const SUPABASE_PROJECT_REF: &str = "supabase_project_ref";
    pub const SUPABASE_URL: &str = "supabase_url";
    pub const ANON_KEY: &str = "anon_key";
    pub const SERVICE_KEY: &str = "service_key";
    pub const DB_PASSWORD: &str = "db_password";
    pub const VERCEL_URL: &str = "vercel_url";
}

/// Deployment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployStatus {
    /// Created, no step has run yet
    Pending,

    /// GitHub provisioning in progress
    DeployingGithub,

    /// Supabase provisioning in progress
    DeployingSupabase,

    /// Vercel provisioning in progress
    DeployingVercel,

    /// Successfully provisioned and serving
    Live,

    /// A hard-stop step failure halted the pipeline
    Failed,
}

impl DeployStatus {
    /// Position in the forward walk through the non-terminal states.
    ///
    /// `Failed` has no rank; re-entering a failed deployment is an explicit
    /// operator-triggered resume, not a forward transition.
    pub fn rank(&self) -> Option<u8> {
        match self {
            DeployStatus::Pending => Some(0),
            DeployStatus::DeployingGithub => Some(1),
            DeployStatus::DeployingSupabase => Some(2),
            DeployStatus::DeployingVercel => Some(3),
            DeployStatus::Live => Some(4),
            DeployStatus::Failed => None,
        }
    }

    /// Check whether the deployment has finished, one way or the other
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployStatus::Live | DeployStatus::Failed)
    }
}

impl std::fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeployStatus::Pending => "pending",
            DeployStatus::DeployingGithub => "deploying_github",
            DeployStatus::DeployingSupabase => "deploying_supabase",
            DeployStatus::DeployingVercel => "deploying_vercel",
            DeployStatus::Live => "live",
            DeployStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Post-deploy health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Never checked
    #[default]
    Unset,

    /// Last check returned HTTP 200
    Healthy,

    /// Redeploy attempts exhausted without a 200
    Unhealthy,
}

/// Identifier for a completed provisioning step.
///
/// Persisted alongside `provider_state` so resume decisions are an explicit
/// lookup rather than inferred from which artifact keys happen to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    Github,
    Supabase,
    Vercel,
}

/// A deployment record — the unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    /// Unique deployment ID
    pub id: String,

    /// Owning project ID
    pub project_id: String,

    /// User who triggered the deployment
    pub created_by: Option<String>,

    /// Current status
    pub status: DeployStatus,

    /// Append-only log lines, each prefixed with a status glyph
    #[serde(default)]
    pub deploy_log: Vec<String>,

    /// Opaque artifacts produced by completed steps; keys only ever grow
    #[serde(default)]
    pub provider_state: BTreeMap<String, String>,

    /// Steps that finished successfully, used by the resume logic
    #[serde(default)]
    pub completed_steps: BTreeSet<StepId>,

    /// Final public URL, set only on success of the Vercel step
    pub deploy_url: Option<String>,

    /// Post-deploy health status
    #[serde(default)]
    pub health_check_status: HealthStatus,

    /// Timestamp of the last health probe
    pub last_health_check_at: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Deployment {
    /// Create a new deployment in `pending`
    pub fn new(id: impl Into<String>, project_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            project_id: project_id.into(),
            created_by: None,
            status: DeployStatus::Pending,
            deploy_log: Vec::new(),
            provider_state: BTreeMap::new(),
            completed_steps: BTreeSet::new(),
            deploy_url: None,
            health_check_status: HealthStatus::Unset,
            last_health_check_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Read a provider_state value
    pub fn provider_value(&self, key: &str) -> Option<&str> {
        self.provider_state.get(key).map(|s| s.as_str())
    }

    /// Check whether a step completed, guarded by the presence of the
    /// artifact key that step is required to produce
    pub fn step_complete(&self, step: StepId, artifact_key: &str) -> bool {
        self.completed_steps.contains(&step) && self.provider_state.contains_key(artifact_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_rank_is_forward_ordered() {
        assert!(DeployStatus::Pending.rank() < DeployStatus::DeployingGithub.rank());
        assert!(DeployStatus::DeployingGithub.rank() < DeployStatus::DeployingSupabase.rank());
        assert!(DeployStatus::DeployingSupabase.rank() < DeployStatus::DeployingVercel.rank());
        assert!(DeployStatus::DeployingVercel.rank() < DeployStatus::Live.rank());
        assert_eq!(DeployStatus::Failed.rank(), None);
    }

    #[test]
    fn test_status_serde_snake_case() {
        let json = serde_json::to_string(&DeployStatus::DeployingSupabase).unwrap();
        assert_eq!(json, "\"deploying_supabase\"");

        let status: DeployStatus = serde_json::from_str("\"deploying_vercel\"").unwrap();
        assert_eq!(status, DeployStatus::DeployingVercel);
    }

    #[test]
    fn test_step_complete_requires_artifact() {
        let mut dep = Deployment::new("d-1", "p-1");
        dep.completed_steps.insert(StepId::Github);
        assert!(!dep.step_complete(StepId::Github, keys::GITHUB_URL));

        dep.provider_state
            .insert(keys::GITHUB_URL.to_string(), "https://github.com/acme/app".to_string());
        assert!(dep.step_complete(StepId::Github, keys::GITHUB_URL));
    }
}
