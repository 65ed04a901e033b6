//! End-to-end job lifecycle tests against the in-memory store.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::watch;

use queuectl_core::error::{AppError, ErrorKind};
use queuectl_core::result::AppResult;
use queuectl_database::memory::MemoryJobStore;
use queuectl_database::store::JobStore;
use queuectl_entity::job::{EnqueueRequest, Job, JobClaim, JobCounts, JobPatch, JobState};
use queuectl_worker::{BackoffPolicy, JobOutcome, JobQueue, ShellExecutor, WorkerRunner};

fn shell() -> Arc<ShellExecutor> {
    Arc::new(ShellExecutor::new("sh", Duration::from_secs(10)))
}

fn queue_on(store: Arc<dyn JobStore>) -> Arc<JobQueue> {
    Arc::new(JobQueue::new(store, BackoffPolicy::new(2), 3))
}

#[tokio::test]
async fn successful_command_completes_job() {
    let queue = queue_on(MemoryJobStore::arc());
    let job = queue
        .enqueue(EnqueueRequest::command("true").with_max_retries(2))
        .await
        .unwrap();

    let runner = WorkerRunner::new(Arc::clone(&queue), shell(), "worker-1", Duration::from_millis(10));
    let outcome = runner.run_once().await.unwrap().unwrap();
    assert!(matches!(outcome, JobOutcome::Completed(_)));

    let job = queue.get(&job.id).await.unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert!(job.processing_by.is_none());
    assert!(job.locked_at.is_none());
    assert_eq!(job.attempts, 0);
}

#[tokio::test]
async fn failing_command_retries_then_dead_letters() {
    let queue = queue_on(MemoryJobStore::arc());
    let job = queue
        .enqueue(EnqueueRequest::command("false").with_max_retries(1))
        .await
        .unwrap();
    let executor = shell();

    // First failure: retry scheduled base^1 = 2 seconds out.
    let claimed = queue.claim("worker-1").await.unwrap().unwrap();
    let err = queuectl_worker::CommandRunner::run(executor.as_ref(), &claimed.command)
        .await
        .unwrap_err();
    let before = Utc::now();
    let failed = queue
        .mark_failed(&job.id, &claimed.claim().unwrap(), &err.to_string())
        .await
        .unwrap();
    assert_eq!(failed.state, JobState::Failed);
    assert_eq!(failed.attempts, 1);
    let next = failed.next_run_at.unwrap();
    assert!(next >= before + ChronoDuration::seconds(2));
    assert!(next <= Utc::now() + ChronoDuration::seconds(2));
    assert_eq!(next - failed.updated_at, ChronoDuration::seconds(2));

    // Not claimable until the backoff elapses.
    assert!(queue.claim("worker-1").await.unwrap().is_none());

    // Second failure exceeds max_retries = 1.
    let reclaimed = queue
        .claim_at("worker-2", next)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reclaimed.id, job.id);
    assert_eq!(reclaimed.processing_by.as_deref(), Some("worker-2"));
    let dead = queue
        .mark_failed_at(&job.id, &reclaimed.claim().unwrap(), "exit status: 1", next)
        .await
        .unwrap();
    assert_eq!(dead.state, JobState::Dead);
    assert_eq!(dead.attempts, 2);
    assert!(dead.next_run_at.is_none());
    assert!(dead.is_consistent());

    let dlq = queue.list(Some(JobState::Dead)).await.unwrap();
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].id, job.id);
}

#[tokio::test]
async fn dead_after_exactly_max_retries_plus_one_failures() {
    for max_retries in 0..4 {
        let queue = queue_on(MemoryJobStore::arc());
        let job = queue
            .enqueue(EnqueueRequest::command("false").with_max_retries(max_retries))
            .await
            .unwrap();

        let mut now = Utc::now();
        for failure in 1..=max_retries + 1 {
            let claimed = queue.claim_at("worker-1", now).await.unwrap().unwrap();
            let job = queue
                .mark_failed_at(&job.id, &claimed.claim().unwrap(), "boom", now)
                .await
                .unwrap();
            if failure <= max_retries {
                assert_eq!(job.state, JobState::Failed);
                now = job.next_run_at.unwrap();
            } else {
                assert_eq!(job.state, JobState::Dead);
                assert!(job.next_run_at.is_none());
            }
        }
    }
}

#[tokio::test]
async fn concurrent_claims_never_share_a_job() {
    let store = MemoryJobStore::arc();
    let queue = queue_on(store);
    let job = queue.enqueue(EnqueueRequest::command("true")).await.unwrap();

    let claims = (0..20).map(|i| {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.claim(&format!("worker-{i}")).await })
    });
    let claimed: Vec<Job> = futures::future::join_all(claims)
        .await
        .into_iter()
        .filter_map(|r| r.unwrap().unwrap())
        .collect();

    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, job.id);
}

#[tokio::test]
async fn concurrent_claims_over_many_jobs_are_disjoint() {
    let queue = queue_on(MemoryJobStore::arc());
    for i in 0..10 {
        queue
            .enqueue(EnqueueRequest::command(format!("echo {i}")))
            .await
            .unwrap();
    }

    let claims = (0..25).map(|i| {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.claim(&format!("worker-{i}")).await })
    });
    let mut ids: Vec<String> = futures::future::join_all(claims)
        .await
        .into_iter()
        .filter_map(|r| r.unwrap().unwrap())
        .map(|job| job.id)
        .collect();

    assert_eq!(ids.len(), 10);
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 10);
}

#[tokio::test]
async fn list_is_ordered_and_filtered() {
    let store = MemoryJobStore::arc();
    let queue = queue_on(store.clone());
    let base = Utc::now() - ChronoDuration::seconds(60);
    for (i, id) in ["c", "a", "d", "b"].iter().enumerate() {
        let created = base + ChronoDuration::seconds([3, 0, 2, 1][i]);
        store
            .insert(&Job::new_pending(Some(id.to_string()), "true".into(), 3, created))
            .await
            .unwrap();
    }
    let claimed = queue.claim("worker-1").await.unwrap().unwrap();
    queue
        .mark_completed("a", &claimed.claim().unwrap())
        .await
        .unwrap();

    let all: Vec<_> = queue.list(None).await.unwrap().into_iter().map(|j| j.id).collect();
    assert_eq!(all, vec!["a", "b", "d", "c"]);

    let pending: Vec<_> = queue
        .list(Some(JobState::Pending))
        .await
        .unwrap()
        .into_iter()
        .map(|j| j.id)
        .collect();
    assert_eq!(pending, vec!["b", "d", "c"]);

    let completed = queue.list(Some(JobState::Completed)).await.unwrap();
    assert_eq!(completed.len(), 1);
}

#[tokio::test]
async fn retry_dead_job_round_trip() {
    let queue = queue_on(MemoryJobStore::arc());
    let job = queue
        .enqueue(EnqueueRequest::command("false").with_max_retries(0))
        .await
        .unwrap();

    let runner = WorkerRunner::new(Arc::clone(&queue), shell(), "worker-1", Duration::from_millis(10));
    let outcome = runner.run_once().await.unwrap().unwrap();
    assert_eq!(outcome.job().state, JobState::Dead);

    let err = queue.retry_dead_job("missing").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let retried = queue.retry_dead_job(&job.id).await.unwrap();
    assert_eq!(retried.state, JobState::Pending);
    assert_eq!(retried.attempts, 0);
    assert!(retried.next_run_at.unwrap() <= Utc::now());

    let err = queue.retry_dead_job(&job.id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidState);
    assert_eq!(queue.get(&job.id).await.unwrap(), retried);
}

#[tokio::test]
async fn worker_loop_drains_queue_and_stops() {
    let queue = queue_on(MemoryJobStore::arc());
    let ok = queue.enqueue(EnqueueRequest::command("true")).await.unwrap();
    let bad = queue
        .enqueue(EnqueueRequest::command("exit 2").with_max_retries(0))
        .await
        .unwrap();

    let runner = WorkerRunner::new(Arc::clone(&queue), shell(), "worker-1", Duration::from_millis(10));
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { runner.run(rx).await });

    let mut counts = JobCounts::default();
    for _ in 0..200 {
        counts = queue.status().await.unwrap();
        if counts.completed == 1 && counts.dead == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.dead, 1);

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(queue.get(&ok.id).await.unwrap().state, JobState::Completed);
    let bad = queue.get(&bad.id).await.unwrap();
    assert!(bad.last_error.unwrap().contains("exit status: 2"));
}

#[tokio::test]
async fn shutdown_waits_for_in_flight_command() {
    let queue = queue_on(MemoryJobStore::arc());
    let job = queue.enqueue(EnqueueRequest::command("sleep 0.3")).await.unwrap();

    let runner = WorkerRunner::new(Arc::clone(&queue), shell(), "worker-1", Duration::from_millis(10));
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { runner.run(rx).await });

    for _ in 0..100 {
        if queue.get(&job.id).await.unwrap().state == JobState::Processing {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(queue.get(&job.id).await.unwrap().state, JobState::Completed);
}

#[tokio::test]
async fn late_report_after_recovery_leaves_new_claim_alone() {
    let queue = queue_on(MemoryJobStore::arc());
    let job = queue.enqueue(EnqueueRequest::command("sleep 0.3")).await.unwrap();

    let runner = WorkerRunner::new(Arc::clone(&queue), shell(), "worker-a", Duration::from_millis(10));
    let handle = tokio::spawn(async move { runner.run_once().await });

    for _ in 0..100 {
        if queue.get(&job.id).await.unwrap().state == JobState::Processing {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    let recovered = queue.recover_stale(Duration::ZERO).await.unwrap();
    assert_eq!(recovered.len(), 1);
    let retry_at = recovered[0].next_run_at.unwrap();
    let second = queue.claim_at("worker-b", retry_at).await.unwrap().unwrap();
    assert_eq!(second.id, job.id);

    let err = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidState);

    let current = queue.get(&job.id).await.unwrap();
    assert_eq!(current.state, JobState::Processing);
    assert_eq!(current.processing_by.as_deref(), Some("worker-b"));
    assert_eq!(current.attempts, 1);

    let done = queue
        .mark_completed(&job.id, &second.claim().unwrap())
        .await
        .unwrap();
    assert_eq!(done.state, JobState::Completed);
}

/// Store whose claims and claimed updates fail a fixed number of times
/// before delegating.
#[derive(Debug, Default)]
struct FlakyStore {
    inner: MemoryJobStore,
    claim_failures: AtomicUsize,
    update_failures: AtomicUsize,
    claim_calls: AtomicUsize,
    update_calls: AtomicUsize,
}

impl FlakyStore {
    fn new(claim_failures: usize, update_failures: usize) -> Arc<Self> {
        Arc::new(Self {
            claim_failures: AtomicUsize::new(claim_failures),
            update_failures: AtomicUsize::new(update_failures),
            ..Self::default()
        })
    }
}

fn take_failure(remaining: &AtomicUsize) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl JobStore for FlakyStore {
    async fn insert(&self, job: &Job) -> AppResult<()> {
        self.inner.insert(job).await
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Job> {
        self.inner.find_by_id(id).await
    }

    async fn list(&self, state: Option<JobState>) -> AppResult<Vec<Job>> {
        self.inner.list(state).await
    }

    async fn counts_by_state(&self) -> AppResult<JobCounts> {
        self.inner.counts_by_state().await
    }

    async fn atomic_claim(&self, worker_id: &str, now: DateTime<Utc>) -> AppResult<Option<Job>> {
        self.claim_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.claim_failures) {
            return Err(AppError::database("connection refused"));
        }
        self.inner.atomic_claim(worker_id, now).await
    }

    async fn update(&self, id: &str, patch: &JobPatch) -> AppResult<Job> {
        self.inner.update(id, patch).await
    }

    async fn update_claimed(
        &self,
        id: &str,
        claim: &JobClaim,
        patch: &JobPatch,
    ) -> AppResult<Option<Job>> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.update_failures) {
            return Err(AppError::database("connection reset"));
        }
        self.inner.update_claimed(id, claim, patch).await
    }

    async fn find_stale_claims(&self, locked_before: DateTime<Utc>) -> AppResult<Vec<Job>> {
        self.inner.find_stale_claims(locked_before).await
    }
}

#[tokio::test]
async fn worker_survives_store_errors() {
    let store = FlakyStore::new(3, 0);
    let queue = queue_on(store.clone());
    let job = queue.enqueue(EnqueueRequest::command("true")).await.unwrap();

    let runner = WorkerRunner::new(Arc::clone(&queue), shell(), "worker-1", Duration::from_millis(10));
    let err = runner.run_once().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Database);

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { runner.run(rx).await });

    for _ in 0..200 {
        if queue.get(&job.id).await.unwrap().state == JobState::Completed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(queue.get(&job.id).await.unwrap().state, JobState::Completed);
    assert!(store.claim_calls.load(Ordering::SeqCst) >= 4);

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn outcome_is_kept_until_the_store_records_it() {
    let store = FlakyStore::new(0, 3);
    let queue = queue_on(store.clone());
    let job = queue.enqueue(EnqueueRequest::command("true")).await.unwrap();

    let runner = WorkerRunner::new(Arc::clone(&queue), shell(), "worker-1", Duration::from_millis(10));
    let outcome = runner.run_once().await.unwrap().unwrap();
    assert!(matches!(outcome, JobOutcome::Completed(_)));
    assert_eq!(store.update_calls.load(Ordering::SeqCst), 4);

    let job = queue.get(&job.id).await.unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert!(job.processing_by.is_none());
}

#[tokio::test]
async fn failure_outcome_is_retried_through_shutdown() {
    let store = FlakyStore::new(0, 3);
    let queue = queue_on(store.clone());
    let job = queue.enqueue(EnqueueRequest::command("sleep 0.2; exit 3")).await.unwrap();

    let runner = WorkerRunner::new(Arc::clone(&queue), shell(), "worker-1", Duration::from_millis(10));
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { runner.run(rx).await });

    for _ in 0..100 {
        if queue.get(&job.id).await.unwrap().state == JobState::Processing {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    let job = queue.get(&job.id).await.unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempts, 1);
    assert!(job.last_error.unwrap().contains("exit status: 3"));
    assert_eq!(store.update_calls.load(Ordering::SeqCst), 4);
}
