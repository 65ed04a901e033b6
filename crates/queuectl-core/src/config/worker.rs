//! Worker process configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Worker loop and pool supervisor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Milliseconds a worker sleeps when no job is due.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Wall-clock limit for a single command, in seconds.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,
    /// Shell used to interpret job commands.
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Path to the worker process binary. Defaults to `queuectl-worker`
    /// next to the running executable.
    #[serde(default)]
    pub executable: Option<String>,
    /// File recording the pids of workers started by `worker start`.
    #[serde(default = "default_pid_file")]
    pub pid_file: String,
}

impl WorkerConfig {
    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Command timeout as a [`Duration`].
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            command_timeout_seconds: default_command_timeout(),
            shell: default_shell(),
            executable: None,
            pid_file: default_pid_file(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_command_timeout() -> u64 {
    300
}

fn default_shell() -> String {
    "sh".to_string()
}

fn default_pid_file() -> String {
    "data/queuectl-workers.json".to_string()
}
