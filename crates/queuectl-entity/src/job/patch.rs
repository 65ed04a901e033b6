//! Partial field updates applied by the store's `update` operation.

use chrono::{DateTime, Utc};

use super::model::Job;
use super::state::JobState;

/// Set of fields to overwrite on a job.
///
/// `None` leaves a field untouched. Nullable columns use a nested option so
/// that `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub state: Option<JobState>,
    pub attempts: Option<i32>,
    pub updated_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<Option<DateTime<Utc>>>,
    pub processing_by: Option<Option<String>>,
    pub locked_at: Option<Option<DateTime<Utc>>>,
    pub last_error: Option<Option<String>>,
}

impl JobPatch {
    /// Successful execution: terminal `completed`, claim released.
    pub fn completed(now: DateTime<Utc>) -> Self {
        Self {
            state: Some(JobState::Completed),
            updated_at: Some(now),
            processing_by: Some(None),
            locked_at: Some(None),
            ..Self::default()
        }
    }

    /// Failed execution that stays retryable until `next_run_at`.
    pub fn failed(
        attempts: i32,
        error: String,
        next_run_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            state: Some(JobState::Failed),
            attempts: Some(attempts),
            updated_at: Some(now),
            next_run_at: Some(Some(next_run_at)),
            processing_by: Some(None),
            locked_at: Some(None),
            last_error: Some(Some(error)),
        }
    }

    /// Failed execution that exhausted the retry budget.
    pub fn dead(attempts: i32, error: String, now: DateTime<Utc>) -> Self {
        Self {
            state: Some(JobState::Dead),
            attempts: Some(attempts),
            updated_at: Some(now),
            next_run_at: Some(None),
            processing_by: Some(None),
            locked_at: Some(None),
            last_error: Some(Some(error)),
        }
    }

    /// Operator retry of a dead job: fresh budget, due immediately.
    pub fn requeued(now: DateTime<Utc>) -> Self {
        Self {
            state: Some(JobState::Pending),
            attempts: Some(0),
            updated_at: Some(now),
            next_run_at: Some(Some(now)),
            processing_by: Some(None),
            locked_at: Some(None),
            ..Self::default()
        }
    }

    /// Apply the patch to an in-memory job.
    pub fn apply(&self, job: &mut Job) {
        if let Some(state) = self.state {
            job.state = state;
        }
        if let Some(attempts) = self.attempts {
            job.attempts = attempts;
        }
        if let Some(updated_at) = self.updated_at {
            job.updated_at = updated_at;
        }
        if let Some(next_run_at) = self.next_run_at {
            job.next_run_at = next_run_at;
        }
        if let Some(processing_by) = &self.processing_by {
            job.processing_by = processing_by.clone();
        }
        if let Some(locked_at) = self.locked_at {
            job.locked_at = locked_at;
        }
        if let Some(last_error) = &self.last_error {
            job.last_error = last_error.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn claimed_job() -> Job {
        let now = Utc::now();
        let mut job = Job::new_pending(Some("p1".into()), "false".into(), 1, now);
        job.state = JobState::Processing;
        job.processing_by = Some("worker-1".into());
        job.locked_at = Some(now);
        job
    }

    #[test]
    fn test_failed_patch_releases_claim() {
        let mut job = claimed_job();
        let now = Utc::now();
        JobPatch::failed(1, "exit 1".into(), now + Duration::seconds(2), now).apply(&mut job);
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.last_error.as_deref(), Some("exit 1"));
        assert!(job.processing_by.is_none());
        assert!(job.is_consistent());
    }

    #[test]
    fn test_dead_patch_clears_schedule() {
        let mut job = claimed_job();
        JobPatch::dead(2, "exit 1".into(), Utc::now()).apply(&mut job);
        assert_eq!(job.state, JobState::Dead);
        assert!(job.next_run_at.is_none());
        assert!(job.is_consistent());
    }

    #[test]
    fn test_empty_patch_leaves_job_untouched() {
        let mut job = claimed_job();
        let before = job.clone();
        JobPatch::default().apply(&mut job);
        assert_eq!(job, before);
    }
}
