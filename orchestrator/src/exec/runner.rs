//! Single-attempt command runner
//!
//! Executes one external CLI invocation with a hard timeout and captures
//! merged stdout+stderr. Failures of any kind (non-zero exit, timeout,
//! missing binary) are reported through the `succeeded` flag, never as
//! errors; retry policy lives a layer up.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Specification for one external command invocation
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Payload piped to the child's stdin; used for secret values that must
    /// never appear in process listings
    pub stdin: Option<String>,
    pub timeout: Duration,
    /// Indices of args holding secret values, redacted in display output
    redacted: Vec<usize>,
}

impl CommandSpec {
    /// Create a new command spec with the default 300s timeout
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            stdin: None,
            timeout: Duration::from_secs(300),
            redacted: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an argument whose value is redacted in display output
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.redacted.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, payload: impl Into<String>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Loggable command line with secret arguments masked
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        for (i, arg) in self.args.iter().enumerate() {
            if self.redacted.contains(&i) {
                parts.push("****".to_string());
            } else {
                parts.push(arg.clone());
            }
        }
        parts.join(" ")
    }
}

/// Outcome of a single command invocation
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub succeeded: bool,
    /// Merged stdout+stderr, or a diagnostic when the process never ran
    pub output: String,
}

impl CommandOutput {
    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            output: output.into(),
        }
    }
}

/// Seam for executing external commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command once, to completion or timeout
    async fn run(&self, spec: &CommandSpec) -> CommandOutput;
}

/// Production runner on top of tokio's process API
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> CommandOutput {
        debug!("Running command: {}", spec.display());

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);

        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return CommandOutput::failure(format!(
                    "failed to spawn {}: {}",
                    spec.program, e
                ));
            }
        };

        if let Some(payload) = &spec.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                    return CommandOutput::failure(format!(
                        "failed to write stdin to {}: {}",
                        spec.program, e
                    ));
                }
                // Dropping the handle closes the pipe
            }
        }

        match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
            Ok(Ok(out)) => {
                let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&out.stderr);
                if !stderr.trim().is_empty() {
                    if !output.is_empty() {
                        output.push('\n');
                    }
                    output.push_str(stderr.trim_end());
                }

                CommandOutput {
                    succeeded: out.status.success(),
                    output,
                }
            }
            Ok(Err(e)) => {
                CommandOutput::failure(format!("failed to run {}: {}", spec.program, e))
            }
            // kill_on_drop reaps the child when the wait future is dropped
            Err(_) => CommandOutput::failure(format!(
                "command timed out after {}s",
                spec.timeout.as_secs()
            )),
        }
    }
}
