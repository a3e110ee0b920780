//! Orchestrator configuration
//!
//! Provider credentials are carried in an explicit configuration struct and
//! injected into each command invocation as environment overrides; the
//! orchestrator itself never reads the process environment.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::errors::OrchestratorError;
use crate::logs::LogLevel;

/// Configuration passed into the orchestrator at construction time
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// GitHub provider configuration
    pub github: GithubConfig,

    /// Supabase provider configuration
    pub supabase: SupabaseConfig,

    /// Vercel provider configuration
    pub vercel: VercelConfig,

    /// Hard timeout for each provisioning command invocation
    pub command_timeout: Duration,

    /// Retry policy for provider commands
    pub retry: RetrySettings,

    /// Post-deploy health check options
    pub health: HealthOptions,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            github: GithubConfig::default(),
            supabase: SupabaseConfig::default(),
            vercel: VercelConfig::default(),
            command_timeout: Duration::from_secs(300),
            retry: RetrySettings::default(),
            health: HealthOptions::default(),
        }
    }
}

/// GitHub provider configuration
#[derive(Debug, Clone)]
pub struct GithubConfig {
    /// Token for the `gh` CLI, passed as GH_TOKEN
    pub token: SecretString,

    /// Organization the private repository is created under
    pub org: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token: SecretString::from(String::new()),
            org: String::new(),
        }
    }
}

/// Supabase provider configuration
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Access token for the `supabase` CLI, passed as SUPABASE_ACCESS_TOKEN
    pub access_token: SecretString,

    /// Target organization ID for project creation
    pub org_id: String,

    /// Target region for project creation
    pub region: String,
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            access_token: SecretString::from(String::new()),
            org_id: String::new(),
            region: String::new(),
        }
    }
}

/// Vercel provider configuration
#[derive(Debug, Clone)]
pub struct VercelConfig {
    /// Token for the `vercel` CLI, passed as VERCEL_TOKEN
    pub token: SecretString,

    /// Optional team/scope slug
    pub scope: Option<String>,
}

impl Default for VercelConfig {
    fn default() -> Self {
        Self {
            token: SecretString::from(String::new()),
            scope: None,
        }
    }
}

/// Retry policy for provider commands
#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Maximum attempts per command
    pub max_retries: u32,

    /// Exponential backoff base: waits backoff_base^attempt seconds
    pub backoff_base: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: 2.0,
        }
    }
}

/// Post-deploy health check options
#[derive(Debug, Clone)]
pub struct HealthOptions {
    /// Delay before the first probe, and between redeploy and re-probe
    pub propagation_delay: Duration,

    /// Timeout for each health probe request
    pub request_timeout: Duration,

    /// Bounded redeploy attempts on failing probes
    pub max_redeploys: u32,

    /// Retry budget for the redeploy command, smaller than the original step
    pub redeploy_retries: u32,
}

impl Default for HealthOptions {
    fn default() -> Self {
        Self {
            propagation_delay: Duration::from_secs(10),
            request_timeout: Duration::from_secs(15),
            max_redeploys: 2,
            redeploy_retries: 2,
        }
    }
}

// ================================ SETTINGS FILE ================================= //

/// On-disk settings document (`settings.json` in the storage base directory)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Base directory for deployment and project records
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Provider credentials and targets
    #[serde(default)]
    pub providers: ProviderSettings,

    /// Per-command timeout in seconds
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Retry attempts per provider command
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Exponential backoff base
    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,

    /// Health check propagation delay in seconds
    #[serde(default = "default_propagation_delay_secs")]
    pub propagation_delay_secs: u64,

    /// Bounded redeploy attempts after failing health checks
    #[serde(default = "default_max_redeploys")]
    pub max_redeploys: u32,
}

fn default_base_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/lib/shipwright")
    }

    #[cfg(not(target_os = "linux"))]
    {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".shipwright")
    }
}

fn default_command_timeout_secs() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base() -> f64 {
    2.0
}

fn default_propagation_delay_secs() -> u64 {
    10
}

fn default_max_redeploys() -> u32 {
    2
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            base_dir: default_base_dir(),
            providers: ProviderSettings::default(),
            command_timeout_secs: default_command_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_base: default_backoff_base(),
            propagation_delay_secs: default_propagation_delay_secs(),
            max_redeploys: default_max_redeploys(),
        }
    }
}

/// Provider credentials section of the settings document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub github: GithubSettings,

    #[serde(default)]
    pub supabase: SupabaseSettings,

    #[serde(default)]
    pub vercel: VercelSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GithubSettings {
    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub org: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupabaseSettings {
    #[serde(default)]
    pub access_token: String,

    #[serde(default)]
    pub org_id: String,

    #[serde(default = "default_supabase_region")]
    pub region: String,
}

fn default_supabase_region() -> String {
    "us-east-1".to_string()
}

impl Default for SupabaseSettings {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            org_id: String::new(),
            region: default_supabase_region(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VercelSettings {
    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub scope: Option<String>,
}

impl Settings {
    /// Convert the settings document into an orchestrator configuration.
    ///
    /// Fails when a required credential or target is missing, so a
    /// misconfigured host is rejected before any provider is touched.
    pub fn to_config(&self) -> Result<OrchestratorConfig, OrchestratorError> {
        let p = &self.providers;

        if p.github.token.is_empty() || p.github.org.is_empty() {
            return Err(OrchestratorError::ConfigError(
                "providers.github.token and providers.github.org are required".to_string(),
            ));
        }
        if p.supabase.access_token.is_empty() || p.supabase.org_id.is_empty() {
            return Err(OrchestratorError::ConfigError(
                "providers.supabase.access_token and providers.supabase.org_id are required"
                    .to_string(),
            ));
        }
        if p.vercel.token.is_empty() {
            return Err(OrchestratorError::ConfigError(
                "providers.vercel.token is required".to_string(),
            ));
        }

        Ok(OrchestratorConfig {
            github: GithubConfig {
                token: SecretString::from(p.github.token.clone()),
                org: p.github.org.clone(),
            },
            supabase: SupabaseConfig {
                access_token: SecretString::from(p.supabase.access_token.clone()),
                org_id: p.supabase.org_id.clone(),
                region: p.supabase.region.clone(),
            },
            vercel: VercelConfig {
                token: SecretString::from(p.vercel.token.clone()),
                scope: p.vercel.scope.clone(),
            },
            command_timeout: Duration::from_secs(self.command_timeout_secs),
            retry: RetrySettings {
                max_retries: self.max_retries,
                backoff_base: self.backoff_base,
            },
            health: HealthOptions {
                propagation_delay: Duration::from_secs(self.propagation_delay_secs),
                max_redeploys: self.max_redeploys,
                ..Default::default()
            },
        })
    }
}
