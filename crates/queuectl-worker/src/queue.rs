//! Job manager — the only place job state transitions are decided.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing;

use queuectl_core::config::QueueConfig;
use queuectl_core::error::{AppError, ErrorKind};
use queuectl_database::store::JobStore;
use queuectl_entity::job::{EnqueueRequest, Job, JobClaim, JobCounts, JobPatch, JobState};

use crate::backoff::BackoffPolicy;

/// Job queue for enqueuing, claiming, and reporting on jobs.
///
/// Storage is delegated to a [`JobStore`]; retry timing is delegated to a
/// [`BackoffPolicy`]. Methods with an `_at` suffix take the current time
/// explicitly; the plain variants use the system clock.
#[derive(Debug, Clone)]
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    policy: BackoffPolicy,
    default_max_retries: i32,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(store: Arc<dyn JobStore>, policy: BackoffPolicy, default_max_retries: i32) -> Self {
        Self {
            store,
            policy,
            default_max_retries,
        }
    }

    /// Create a job queue using the configured backoff base and retry default.
    pub fn from_config(store: Arc<dyn JobStore>, config: &QueueConfig) -> Self {
        Self::new(
            store,
            BackoffPolicy::new(config.backoff_base),
            config.default_max_retries,
        )
    }

    /// Validate and insert a new pending job.
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<Job, AppError> {
        let command = request
            .command
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AppError::validation("Job 'command' is required and must not be empty"))?;

        let max_retries = request.max_retries.unwrap_or(self.default_max_retries);
        if max_retries < 0 {
            return Err(AppError::validation(format!(
                "Job 'max_retries' must not be negative (got {max_retries})"
            )));
        }

        let id = match request.id {
            Some(id) if id.trim().is_empty() => {
                return Err(AppError::validation("Job 'id' must not be empty"));
            }
            other => other,
        };

        let job = Job::new_pending(id, command, max_retries, Utc::now());
        self.store.insert(&job).await?;

        tracing::info!(
            job_id = %job.id,
            max_retries = job.max_retries,
            "Enqueued job: {}",
            job.command
        );
        Ok(job)
    }

    /// All jobs, oldest first, optionally restricted to one state.
    pub async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>, AppError> {
        self.store.list(state).await
    }

    /// Fetch a single job.
    pub async fn get(&self, job_id: &str) -> Result<Job, AppError> {
        self.store.find_by_id(job_id).await
    }

    /// Number of jobs in each state.
    pub async fn status(&self) -> Result<JobCounts, AppError> {
        self.store.counts_by_state().await
    }

    /// Claim the next due job for `worker_id`.
    pub async fn claim(&self, worker_id: &str) -> Result<Option<Job>, AppError> {
        self.claim_at(worker_id, Utc::now()).await
    }

    /// Claim the next job due at `now`.
    pub async fn claim_at(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>, AppError> {
        let job = self.store.atomic_claim(worker_id, now).await?;
        if let Some(job) = &job {
            tracing::debug!(
                job_id = %job.id,
                worker_id,
                attempt = job.attempts + 1,
                "Claimed job"
            );
        }
        Ok(job)
    }

    /// Record a successful execution made under `claim`.
    ///
    /// Fails with `InvalidState` if the claim is no longer held, leaving the
    /// job untouched.
    pub async fn mark_completed(&self, job_id: &str, claim: &JobClaim) -> Result<Job, AppError> {
        let job = self
            .store
            .update_claimed(job_id, claim, &JobPatch::completed(Utc::now()))
            .await?
            .ok_or_else(|| claim_lost(job_id, claim))?;
        tracing::debug!(job_id, "Job completed");
        Ok(job)
    }

    /// Record a failed execution made under `claim`.
    pub async fn mark_failed(
        &self,
        job_id: &str,
        claim: &JobClaim,
        error: &str,
    ) -> Result<Job, AppError> {
        self.mark_failed_at(job_id, claim, error, Utc::now()).await
    }

    /// Record a failed execution made under `claim`, observed at `now`.
    ///
    /// Increments `attempts`; the job is dead-lettered once `attempts`
    /// exceeds `max_retries`, otherwise it becomes claimable again after
    /// `base^attempts` seconds. Fails with `InvalidState` if the claim is no
    /// longer held.
    pub async fn mark_failed_at(
        &self,
        job_id: &str,
        claim: &JobClaim,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<Job, AppError> {
        let job = self.store.find_by_id(job_id).await?;
        if job.claim().as_ref() != Some(claim) {
            return Err(claim_lost(job_id, claim));
        }
        let attempts = job.attempts + 1;

        let patch = if self.policy.should_dead_letter(attempts, job.max_retries) {
            JobPatch::dead(attempts, error.to_string(), now)
        } else {
            let next_run_at = now + self.policy.delay_for(attempts);
            JobPatch::failed(attempts, error.to_string(), next_run_at, now)
        };

        let job = self
            .store
            .update_claimed(job_id, claim, &patch)
            .await?
            .ok_or_else(|| claim_lost(job_id, claim))?;
        match job.next_run_at {
            Some(next_run_at) => tracing::warn!(
                job_id,
                attempts,
                max_retries = job.max_retries,
                next_run_at = %next_run_at,
                "Job failed, retry scheduled: {}",
                error
            ),
            None => tracing::error!(
                job_id,
                attempts,
                max_retries = job.max_retries,
                "Job moved to dead-letter queue: {}",
                error
            ),
        }
        Ok(job)
    }

    /// Requeue a dead job with a fresh retry budget.
    pub async fn retry_dead_job(&self, job_id: &str) -> Result<Job, AppError> {
        let job = self.store.find_by_id(job_id).await?;
        if job.state != JobState::Dead {
            return Err(AppError::invalid_state(format!(
                "Job '{}' is {}, only dead jobs can be retried",
                job.id, job.state
            )));
        }

        let job = self
            .store
            .update(job_id, &JobPatch::requeued(Utc::now()))
            .await?;
        tracing::info!(job_id, "Dead job requeued");
        Ok(job)
    }

    /// Record a failure for every claim held longer than `older_than`.
    ///
    /// Workers never do this on their own; it is an operator action for
    /// claims orphaned by a worker that died mid-job.
    pub async fn recover_stale(&self, older_than: Duration) -> Result<Vec<Job>, AppError> {
        let now = Utc::now();
        let threshold = chrono::Duration::from_std(older_than)
            .map_err(|e| AppError::validation(format!("Invalid recovery threshold: {e}")))?;

        let stale = self.store.find_stale_claims(now - threshold).await?;
        let mut recovered = Vec::with_capacity(stale.len());
        for job in stale {
            let Some(claim) = job.claim() else {
                continue;
            };
            let message = format!(
                "claim expired: held by {} since {}",
                claim.worker_id,
                claim.locked_at.to_rfc3339()
            );
            match self.mark_failed_at(&job.id, &claim, &message, now).await {
                Ok(job) => recovered.push(job),
                Err(e) if e.is(ErrorKind::InvalidState) => {
                    tracing::debug!(job_id = %job.id, "Claim released before recovery, skipping");
                }
                Err(e) => return Err(e),
            }
        }

        if !recovered.is_empty() {
            tracing::info!(count = recovered.len(), "Recovered stale claims");
        }
        Ok(recovered)
    }
}

fn claim_lost(job_id: &str, claim: &JobClaim) -> AppError {
    AppError::invalid_state(format!(
        "Job '{}' is no longer claimed by '{}' (claim taken at {})",
        job_id,
        claim.worker_id,
        claim.locked_at.to_rfc3339()
    ))
}
