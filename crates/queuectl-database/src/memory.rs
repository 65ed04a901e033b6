//! In-memory job store for tests and single-process embedding.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use queuectl_core::error::AppError;
use queuectl_core::result::AppResult;
use queuectl_entity::job::{Job, JobClaim, JobCounts, JobPatch, JobState};

use crate::store::JobStore;

/// Job store backed by a mutex-guarded map.
///
/// Every operation holds the single lock for its whole read-modify-write,
/// which is what makes `atomic_claim` exclusive.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, Job>>,
}

impl MemoryJobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store wrapped in an `Arc`.
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

fn sorted(mut jobs: Vec<Job>) -> Vec<Job> {
    jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    jobs
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &Job) -> AppResult<()> {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&job.id) {
            return Err(AppError::conflict(format!("Job '{}' already exists", job.id)));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Job> {
        self.jobs
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("Job '{id}' not found")))
    }

    async fn list(&self, state: Option<JobState>) -> AppResult<Vec<Job>> {
        let jobs = self.jobs.lock().await;
        Ok(sorted(
            jobs.values()
                .filter(|j| state.is_none_or(|s| j.state == s))
                .cloned()
                .collect(),
        ))
    }

    async fn counts_by_state(&self) -> AppResult<JobCounts> {
        let jobs = self.jobs.lock().await;
        let mut counts = JobCounts::default();
        for job in jobs.values() {
            counts.add(job.state, 1);
        }
        Ok(counts)
    }

    async fn atomic_claim(&self, worker_id: &str, now: DateTime<Utc>) -> AppResult<Option<Job>> {
        let mut jobs = self.jobs.lock().await;

        let next_id = jobs
            .values()
            .filter(|j| j.is_due(now))
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            .map(|j| j.id.clone());

        let Some(id) = next_id else {
            return Ok(None);
        };

        let Some(job) = jobs.get_mut(&id) else {
            return Ok(None);
        };
        job.state = JobState::Processing;
        job.processing_by = Some(worker_id.to_string());
        job.locked_at = Some(now);
        job.updated_at = now;

        debug!(job_id = %job.id, worker_id, "Claimed job from memory store");
        Ok(Some(job.clone()))
    }

    async fn update(&self, id: &str, patch: &JobPatch) -> AppResult<Job> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| AppError::not_found(format!("Job '{id}' not found")))?;
        patch.apply(job);
        Ok(job.clone())
    }

    async fn update_claimed(
        &self,
        id: &str,
        claim: &JobClaim,
        patch: &JobPatch,
    ) -> AppResult<Option<Job>> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| AppError::not_found(format!("Job '{id}' not found")))?;
        if job.claim().as_ref() != Some(claim) {
            return Ok(None);
        }
        patch.apply(job);
        Ok(Some(job.clone()))
    }

    async fn find_stale_claims(&self, locked_before: DateTime<Utc>) -> AppResult<Vec<Job>> {
        let jobs = self.jobs.lock().await;
        let mut stale: Vec<Job> = jobs
            .values()
            .filter(|j| j.state == JobState::Processing)
            .filter(|j| j.locked_at.is_some_and(|at| at < locked_before))
            .cloned()
            .collect();
        stale.sort_by_key(|j| j.locked_at);
        Ok(stale)
    }
}
