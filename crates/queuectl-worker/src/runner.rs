//! Worker runner — main loop that polls for jobs and executes them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tracing;

use queuectl_core::config::WorkerConfig;
use queuectl_core::error::{AppError, ErrorKind};
use queuectl_entity::job::{Job, JobClaim};

use crate::executor::CommandRunner;
use crate::queue::JobQueue;

/// Result of one poll-execute-report cycle that found a job.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// The command succeeded and the job is completed.
    Completed(Job),
    /// The command failed; the job is `failed` (retry scheduled) or `dead`.
    Failed(Job),
}

impl JobOutcome {
    /// The job as recorded after the cycle.
    pub fn job(&self) -> &Job {
        match self {
            Self::Completed(job) | Self::Failed(job) => job,
        }
    }
}

/// One worker: a sequential claim / execute / report loop.
#[derive(Debug)]
pub struct WorkerRunner {
    /// Job manager used for claims and outcome reports
    queue: Arc<JobQueue>,
    /// Executes claimed commands
    executor: Arc<dyn CommandRunner>,
    /// Identity recorded in `processing_by`
    worker_id: String,
    /// Sleep between polls when nothing is due
    poll_interval: Duration,
}

impl WorkerRunner {
    /// Create a new worker runner
    pub fn new(
        queue: Arc<JobQueue>,
        executor: Arc<dyn CommandRunner>,
        worker_id: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            executor,
            worker_id: worker_id.into(),
            poll_interval,
        }
    }

    /// Create a worker runner using the configured poll interval
    pub fn from_config(
        queue: Arc<JobQueue>,
        executor: Arc<dyn CommandRunner>,
        worker_id: impl Into<String>,
        config: &WorkerConfig,
    ) -> Self {
        Self::new(queue, executor, worker_id, config.poll_interval())
    }

    /// This worker's identity
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Run until the cancel signal is received.
    ///
    /// The signal is checked between cycles only: a command that is already
    /// running finishes and its outcome is recorded before the loop exits.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        tracing::info!(
            "Worker '{}' started with poll_interval={}ms",
            self.worker_id,
            self.poll_interval.as_millis()
        );

        loop {
            if *cancel.borrow() {
                tracing::info!("Worker '{}' received shutdown signal", self.worker_id);
                break;
            }

            match self.run_once().await {
                Ok(Some(_)) => continue,
                Ok(None) => tracing::trace!("No jobs due"),
                Err(e) => tracing::error!("Worker '{}' poll cycle failed: {}", self.worker_id, e),
            }

            if !self.idle(&mut cancel).await {
                tracing::info!("Worker '{}' shutting down", self.worker_id);
                break;
            }
        }

        tracing::info!("Worker '{}' shut down complete", self.worker_id);
    }

    /// Claim one due job, execute it, and record the outcome.
    ///
    /// Returns `Ok(None)` when nothing was due. Command failures are not
    /// errors here; they become a `failed` or `dead` outcome. Errors are
    /// store failures while claiming, or a report refused because the claim
    /// was recovered in the meantime.
    ///
    /// Once the command has run, a report that hits a store failure is
    /// retried every poll interval until it is recorded.
    pub async fn run_once(&self) -> Result<Option<JobOutcome>, AppError> {
        let Some(job) = self.queue.claim(&self.worker_id).await? else {
            return Ok(None);
        };
        let claim = job.claim().ok_or_else(|| {
            AppError::internal(format!("Claimed job '{}' carries no claim", job.id))
        })?;

        tracing::info!(
            "Processing job: id={}, attempt={}/{}, cmd='{}'",
            job.id,
            job.attempts + 1,
            job.max_retries + 1,
            job.command
        );

        let failure = match self.executor.run(&job.command).await {
            Ok(output) => {
                tracing::info!(
                    "Job {} completed successfully. stdout: {}",
                    job.id,
                    output.stdout
                );
                None
            }
            Err(err) => {
                tracing::warn!("Job {} failed: {}", job.id, err);
                Some(err.to_string())
            }
        };

        self.report(&job.id, &claim, failure.as_deref()).await.map(Some)
    }

    /// Record an execution outcome, retrying while the store is failing.
    ///
    /// Not interrupted by shutdown: the command already ran, so the outcome
    /// must land before the worker exits.
    async fn report(
        &self,
        job_id: &str,
        claim: &JobClaim,
        failure: Option<&str>,
    ) -> Result<JobOutcome, AppError> {
        loop {
            let result = match failure {
                None => self
                    .queue
                    .mark_completed(job_id, claim)
                    .await
                    .map(JobOutcome::Completed),
                Some(error) => self
                    .queue
                    .mark_failed(job_id, claim, error)
                    .await
                    .map(JobOutcome::Failed),
            };

            match result {
                Err(e) if e.is(ErrorKind::Database) => {
                    tracing::warn!(
                        "Worker '{}' could not record outcome of job {}, retrying in {}ms: {}",
                        self.worker_id,
                        job_id,
                        self.poll_interval.as_millis(),
                        e
                    );
                    time::sleep(self.poll_interval).await;
                }
                other => return other,
            }
        }
    }

    /// Sleep for one poll interval. Returns `false` once shutdown is requested.
    async fn idle(&self, cancel: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            changed = cancel.changed() => changed.is_ok() && !*cancel.borrow(),
            _ = time::sleep(self.poll_interval) => true,
        }
    }
}
