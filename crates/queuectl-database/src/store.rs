//! Job store trait implemented by every persistence backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use queuectl_core::result::AppResult;
use queuectl_entity::job::{Job, JobClaim, JobCounts, JobPatch, JobState};

/// Persistence operations the job manager relies on.
///
/// `atomic_claim` is the only coordination point between workers: an
/// implementation must guarantee that two concurrent callers never receive
/// the same job from it. Every method may fail with
/// [`ErrorKind::Database`](queuectl_core::ErrorKind::Database) on I/O failure.
#[async_trait]
pub trait JobStore: Send + Sync + std::fmt::Debug + 'static {
    /// Insert a new job. Fails with `Conflict` if the id is taken.
    async fn insert(&self, job: &Job) -> AppResult<()>;

    /// Fetch a job. Fails with `NotFound` if absent.
    async fn find_by_id(&self, id: &str) -> AppResult<Job>;

    /// Jobs ordered by `created_at` ascending, optionally filtered by state.
    async fn list(&self, state: Option<JobState>) -> AppResult<Vec<Job>>;

    /// Number of jobs in each state.
    async fn counts_by_state(&self) -> AppResult<JobCounts>;

    /// Claim the oldest job that is `pending` or `failed` and due at `now`,
    /// moving it to `processing` under `worker_id`. Returns the claimed job.
    async fn atomic_claim(&self, worker_id: &str, now: DateTime<Utc>) -> AppResult<Option<Job>>;

    /// Overwrite the patched fields. Fails with `NotFound` if absent.
    async fn update(&self, id: &str, patch: &JobPatch) -> AppResult<Job>;

    /// Overwrite the patched fields only while the job is still `processing`
    /// under exactly `claim`, in one indivisible step. Returns `None` when the
    /// claim is no longer held. Fails with `NotFound` if absent.
    async fn update_claimed(
        &self,
        id: &str,
        claim: &JobClaim,
        patch: &JobPatch,
    ) -> AppResult<Option<Job>>;

    /// `processing` jobs whose claim was taken before `locked_before`,
    /// oldest claim first.
    async fn find_stale_claims(&self, locked_before: DateTime<Utc>) -> AppResult<Vec<Job>>;
}
