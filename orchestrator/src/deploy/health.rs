//! Post-deploy health check loop
//!
//! Probes the deployed URL after a propagation delay and drives bounded
//! redeploy attempts on failure. Exhaustion is a degradation, not a pipeline
//! failure: the deployment stays live with an unhealthy flag.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::config::HealthOptions;
use crate::deploy::{ok_line, warn_line};
use crate::errors::OrchestratorError;
use crate::exec::{CommandSpec, RetryOptions, RetryingExecutor, SleepFn};
use crate::models::deployment::HealthStatus;
use crate::store::DeploymentStore;

/// Seam for the health probe HTTP call
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// GET the URL and return the response status code; any network failure
    /// is reported as 0
    async fn status(&self, url: &str) -> u16;
}

/// Production probe on reqwest
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, OrchestratorError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn status(&self, url: &str) -> u16 {
        match self.client.get(url).send().await {
            Ok(response) => response.status().as_u16(),
            Err(_) => 0,
        }
    }
}

/// Health check and heal loop
pub struct HealthChecker<'a> {
    probe: &'a dyn HealthProbe,
    exec: &'a RetryingExecutor,
    store: &'a dyn DeploymentStore,
    options: &'a HealthOptions,
    sleep_fn: SleepFn,
}

impl<'a> HealthChecker<'a> {
    pub fn new(
        probe: &'a dyn HealthProbe,
        exec: &'a RetryingExecutor,
        store: &'a dyn DeploymentStore,
        options: &'a HealthOptions,
        sleep_fn: SleepFn,
    ) -> Self {
        Self {
            probe,
            exec,
            store,
            options,
            sleep_fn,
        }
    }

    /// Probe `url` until healthy or the redeploy budget is exhausted.
    ///
    /// `redeploy` is the production deploy invocation for this deployment,
    /// re-run with a smaller retry budget between failing probes.
    pub async fn check(
        &self,
        deployment_id: &str,
        url: &str,
        redeploy: &CommandSpec,
    ) -> Result<HealthStatus, OrchestratorError> {
        info!(deployment_id, url, "Starting health check");
        (self.sleep_fn)(self.options.propagation_delay).await;

        let max_redeploys = self.options.max_redeploys;
        for attempt in 0..=max_redeploys {
            let code = self.probe.status(url).await;

            if code == 200 {
                self.store
                    .set_health(deployment_id, HealthStatus::Healthy, Utc::now())
                    .await?;
                self.store
                    .append_log(deployment_id, &ok_line("Health check passed (HTTP 200)"))
                    .await?;
                info!(deployment_id, "Deployment is healthy");
                return Ok(HealthStatus::Healthy);
            }

            warn!(deployment_id, code, "Health check failed");

            if attempt == max_redeploys {
                break;
            }

            // Probe outcome recorded, verdict still open
            self.store
                .set_health(deployment_id, HealthStatus::Unset, Utc::now())
                .await?;
            self.store
                .append_log(
                    deployment_id,
                    &warn_line(format!(
                        "Health check failed (HTTP {}), redeploying ({}/{})",
                        code,
                        attempt + 1,
                        max_redeploys
                    )),
                )
                .await?;

            let options = RetryOptions::new("vercel redeploy", deployment_id)
                .with_budget(self.options.redeploy_retries, 2.0);
            let _ = self.exec.run_with_retry(redeploy, &options).await?;

            (self.sleep_fn)(self.options.propagation_delay).await;
        }

        self.store
            .set_health(deployment_id, HealthStatus::Unhealthy, Utc::now())
            .await?;
        self.store
            .append_log(
                deployment_id,
                &warn_line(format!(
                    "Health check failed after {} redeploys; the deployment remains live but \
                     needs manual inspection",
                    max_redeploys
                )),
            )
            .await?;

        Ok(HealthStatus::Unhealthy)
    }
}
