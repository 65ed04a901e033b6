//! Retry and backoff configuration.

use serde::{Deserialize, Serialize};

/// Job queue retry policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Base of the exponential backoff; the k-th failure waits `base^k` seconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base: u32,
    /// Retry ceiling applied to jobs enqueued without an explicit `max_retries`.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: i32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backoff_base: default_backoff_base(),
            default_max_retries: default_max_retries(),
        }
    }
}

fn default_backoff_base() -> u32 {
    2
}

fn default_max_retries() -> i32 {
    3
}
