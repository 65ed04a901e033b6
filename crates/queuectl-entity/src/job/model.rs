//! Job entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::state::JobState;

/// A shell command queued for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Job {
    /// Unique job identifier.
    pub id: String,
    /// Command line handed to the shell.
    pub command: String,
    /// Current lifecycle state.
    pub state: JobState,
    /// Number of failed executions so far.
    pub attempts: i32,
    /// Failures tolerated before the job is dead-lettered.
    pub max_retries: i32,
    /// When the job was enqueued.
    pub created_at: DateTime<Utc>,
    /// When the job last changed.
    pub updated_at: DateTime<Utc>,
    /// Earliest time the job may be claimed. `None` only while dead.
    pub next_run_at: Option<DateTime<Utc>>,
    /// Worker currently holding the claim.
    pub processing_by: Option<String>,
    /// When the current claim was taken.
    pub locked_at: Option<DateTime<Utc>>,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
}

impl Job {
    /// Build a freshly enqueued job, due immediately.
    pub fn new_pending(
        id: Option<String>,
        command: String,
        max_retries: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            command,
            state: JobState::Pending,
            attempts: 0,
            max_retries,
            created_at: now,
            updated_at: now,
            next_run_at: Some(now),
            processing_by: None,
            locked_at: None,
            last_error: None,
        }
    }

    /// The claim currently held on this job, if it is `processing`.
    pub fn claim(&self) -> Option<JobClaim> {
        if self.state != JobState::Processing {
            return None;
        }
        Some(JobClaim {
            worker_id: self.processing_by.clone()?,
            locked_at: self.locked_at?,
        })
    }

    /// Whether a worker polling at `now` may claim this job.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state.is_claimable() && self.next_run_at.is_some_and(|at| at <= now)
    }

    /// Check the cross-field lifecycle invariants.
    pub fn is_consistent(&self) -> bool {
        let dead = self.state == JobState::Dead;
        let exhausted = self.attempts > self.max_retries;
        let unscheduled = self.next_run_at.is_none();
        let claimed = self.processing_by.is_some() && self.locked_at.is_some();
        let unclaimed = self.processing_by.is_none() && self.locked_at.is_none();

        dead == exhausted
            && dead == unscheduled
            && if self.state == JobState::Processing {
                claimed
            } else {
                unclaimed
            }
    }
}

/// One specific claim on a job.
///
/// Outcome reports carry the claim they were made under, so a report from a
/// worker whose claim was recovered and handed to another worker is refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobClaim {
    /// Worker that took the claim.
    pub worker_id: String,
    /// When the claim was taken.
    pub locked_at: DateTime<Utc>,
}

/// Caller-supplied payload for `enqueue`.
///
/// Every field is optional at the serde level so a missing `command`
/// surfaces as a validation error rather than a parse error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnqueueRequest {
    /// Explicit identifier; generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Command line to execute.
    #[serde(default)]
    pub command: Option<String>,
    /// Per-job retry ceiling; the configured default applies when absent.
    #[serde(default)]
    pub max_retries: Option<i32>,
}

impl EnqueueRequest {
    /// Request for `command` with default id and retries.
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..Self::default()
        }
    }

    /// Set an explicit retry ceiling.
    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set an explicit identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}
