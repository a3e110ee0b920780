//! Retrying command executor
//!
//! Wraps the command runner with exponential-backoff retry and a
//! non-retryable-error classifier. Transient provider failures (network
//! blips, propagation delay, rate limiting) are retried; permanent ones
//! (resource already exists, bad credentials, quota) short-circuit on a
//! case-insensitive substring match so the deploy log stays readable.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::errors::OrchestratorError;
use crate::exec::runner::{CommandOutput, CommandRunner, CommandSpec};
use crate::store::DeploymentStore;
use crate::utils::{calc_exp_backoff, BackoffOptions};

/// Injected sleep, so tests never really wait
pub type SleepFn = Arc<dyn Fn(Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Per-call retry options
#[derive(Debug, Clone)]
pub struct RetryOptions {
    /// Maximum attempts, including the first
    pub max_retries: u32,

    /// Waits backoff_base^attempt seconds between attempts
    pub backoff_base: f64,

    /// Step name used in deploy log lines
    pub step_name: String,

    /// Deployment the log lines are appended to
    pub deployment_id: String,

    /// Case-insensitive substrings marking a failure as permanent
    pub non_retryable_patterns: Vec<String>,
}

impl RetryOptions {
    pub fn new(step_name: impl Into<String>, deployment_id: impl Into<String>) -> Self {
        Self {
            max_retries: 3,
            backoff_base: 2.0,
            step_name: step_name.into(),
            deployment_id: deployment_id.into(),
            non_retryable_patterns: Vec::new(),
        }
    }

    pub fn with_budget(mut self, max_retries: u32, backoff_base: f64) -> Self {
        self.max_retries = max_retries.max(1);
        self.backoff_base = backoff_base;
        self
    }

    pub fn with_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.non_retryable_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }
}

/// Command executor with retry, backoff and deploy-log correlation
pub struct RetryingExecutor {
    runner: Arc<dyn CommandRunner>,
    store: Arc<dyn DeploymentStore>,
    sleep_fn: SleepFn,
}

impl RetryingExecutor {
    pub fn new(runner: Arc<dyn CommandRunner>, store: Arc<dyn DeploymentStore>) -> Self {
        Self {
            runner,
            store,
            sleep_fn: Arc::new(|wait| Box::pin(tokio::time::sleep(wait))),
        }
    }

    /// Replace the sleep implementation (tests pass a no-op)
    pub fn with_sleep_fn(mut self, sleep_fn: SleepFn) -> Self {
        self.sleep_fn = sleep_fn;
        self
    }

    /// Run a command with up to `max_retries` attempts.
    ///
    /// The returned `CommandOutput` carries the final verdict and the last
    /// captured output; `Err` is reserved for store failures while appending
    /// log lines.
    pub async fn run_with_retry(
        &self,
        spec: &CommandSpec,
        options: &RetryOptions,
    ) -> Result<CommandOutput, OrchestratorError> {
        let max_retries = options.max_retries.max(1);

        let mut last = CommandOutput::failure("");
        for attempt in 1..=max_retries {
            debug!(
                deployment_id = %options.deployment_id,
                step = %options.step_name,
                attempt,
                "Running: {}",
                spec.display()
            );

            let out = self.runner.run(spec).await;
            if out.succeeded {
                debug!(
                    deployment_id = %options.deployment_id,
                    step = %options.step_name,
                    attempt,
                    "Command succeeded"
                );
                return Ok(out);
            }

            warn!(
                deployment_id = %options.deployment_id,
                step = %options.step_name,
                attempt,
                "Command failed: {}",
                excerpt(&out.output)
            );

            let lowered = out.output.to_lowercase();
            if let Some(pattern) = options
                .non_retryable_patterns
                .iter()
                .find(|p| lowered.contains(&p.to_lowercase()))
            {
                self.store
                    .append_log(
                        &options.deployment_id,
                        &format!(
                            "✗ {} failed with non-retryable error ({}): {}",
                            options.step_name,
                            pattern,
                            excerpt(&out.output)
                        ),
                    )
                    .await?;
                return Ok(out);
            }

            if attempt == max_retries {
                self.store
                    .append_log(
                        &options.deployment_id,
                        &format!(
                            "✗ {} failed after {} attempts: {}",
                            options.step_name,
                            max_retries,
                            excerpt(&out.output)
                        ),
                    )
                    .await?;
                return Ok(out);
            }

            let wait = calc_exp_backoff(
                &BackoffOptions {
                    base_delay: Duration::from_secs(1),
                    multiplier: options.backoff_base,
                    ..Default::default()
                },
                attempt,
            );

            self.store
                .append_log(
                    &options.deployment_id,
                    &format!(
                        "⚠ {} failed (attempt {}/{}), retrying in {}s",
                        options.step_name,
                        attempt,
                        max_retries,
                        wait.as_secs()
                    ),
                )
                .await?;

            (self.sleep_fn)(wait).await;
            last = out;
        }

        Ok(last)
    }
}

/// First line of command output, truncated for log lines
fn excerpt(output: &str) -> String {
    let first_line = output.lines().next().unwrap_or("").trim();
    if first_line.chars().count() > 200 {
        let truncated: String = first_line.chars().take(200).collect();
        format!("{}…", truncated)
    } else {
        first_line.to_string()
    }
}
