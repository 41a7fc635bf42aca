use async_trait::async_trait;
#[cfg(any(test, feature = "mockall"))]
use mockall::automock;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::error::{GatewayError, GatewayResult};

/// What a successful backend invocation printed, with surrounding whitespace
/// trimmed from both streams.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self { stdout: stdout.into(), stderr: stderr.into() }
    }

    pub fn stdout(stdout: impl Into<String>) -> Self {
        Self::new(stdout, String::new())
    }
}

/// Runs one external command to completion.
///
/// A non-zero exit, a failure to start the process and an exceeded time
/// bound are all reported as errors; a returned `CommandOutput` always means
/// the command succeeded.
#[cfg_attr(any(test, feature = "mockall"), automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> GatewayResult<CommandOutput>;
}

/// `CommandRunner` backed by real child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

pub(crate) fn render_command(program: &str, args: &[String]) -> String {
    let mut rendered = program.to_string();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(arg);
    }
    rendered
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> GatewayResult<CommandOutput> {
        let command = render_command(program, args);
        debug!(command = %command, "Running backend command");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| GatewayError::Spawn { program: program.to_string(), source })?;

        // Dropping the future on timeout drops the child, which kills it.
        let waited = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| GatewayError::TimedOut { command: command.clone(), timeout })?,
            None => child.wait_with_output().await,
        };
        let output = waited.map_err(|source| GatewayError::Io { command: command.clone(), source })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !stdout.is_empty() {
            debug!(command = %command, stdout = %stdout, "Backend stdout");
        }
        if !stderr.is_empty() {
            debug!(command = %command, stderr = %stderr, "Backend stderr");
        }

        if !output.status.success() {
            debug!(command = %command, status = %output.status, "Backend command failed");
            return Err(GatewayError::Failed {
                command,
                status: output.status.to_string(),
                stdout,
                stderr,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}
