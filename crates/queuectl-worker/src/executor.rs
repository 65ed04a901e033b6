//! Command executor — runs a job's command line under a shell with a timeout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time;
use tracing;

use queuectl_core::config::WorkerConfig;
use queuectl_core::error::{AppError, ErrorKind};

/// Longest stderr excerpt carried into a failure message.
const MAX_ERROR_OUTPUT: usize = 2000;

/// Trait for anything that can execute a job's command line.
#[async_trait]
pub trait CommandRunner: Send + Sync + std::fmt::Debug {
    /// Run `command` to completion.
    async fn run(&self, command: &str) -> Result<CommandOutput, CommandError>;
}

/// Captured output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Error from command execution
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The shell could not be started.
    #[error("failed to spawn command: {0}")]
    Spawn(#[source] std::io::Error),

    /// The command ran and reported failure.
    #[error("command failed with {status}: {detail}")]
    NonZeroExit {
        /// Exit status as reported by the OS (`exit status: 1`, `signal: 9`).
        status: String,
        /// Trimmed stderr, or a placeholder when there was none.
        detail: String,
    },

    /// The command outlived the wall-clock limit and was killed.
    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    /// Output could not be collected from the child.
    #[error("failed to collect command output: {0}")]
    Io(#[source] std::io::Error),
}

impl From<CommandError> for AppError {
    fn from(err: CommandError) -> Self {
        Self::with_source(ErrorKind::CommandExecution, err.to_string(), err)
    }
}

/// Runs commands through `<shell> -c`.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
    timeout: Duration,
}

impl ShellExecutor {
    /// Create an executor for the given shell and timeout.
    pub fn new(shell: impl Into<String>, timeout: Duration) -> Self {
        Self {
            shell: shell.into(),
            timeout,
        }
    }

    /// Create an executor from worker configuration.
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(config.shell.clone(), config.command_timeout())
    }
}

#[async_trait]
impl CommandRunner for ShellExecutor {
    async fn run(&self, command: &str) -> Result<CommandOutput, CommandError> {
        // Own process group: a terminal Ctrl+C aimed at the worker must not
        // reach the job.
        let child = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .process_group(0)
            .spawn()
            .map_err(CommandError::Spawn)?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(CommandError::Io)?,
            Err(_) => {
                tracing::warn!(command, timeout_secs = self.timeout.as_secs(), "Command timed out");
                return Err(CommandError::Timeout(self.timeout));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if output.status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            let detail = if stderr.is_empty() {
                "no error output".to_string()
            } else {
                truncate(&stderr, MAX_ERROR_OUTPUT)
            };
            Err(CommandError::NonZeroExit {
                status: output.status.to_string(),
                detail,
            })
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
