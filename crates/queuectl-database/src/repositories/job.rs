//! Job repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use queuectl_core::error::{AppError, ErrorKind};
use queuectl_core::result::AppResult;
use queuectl_entity::job::{Job, JobClaim, JobCounts, JobPatch, JobState};

use crate::store::JobStore;

/// PostgreSQL-backed job store shared by every worker process.
#[derive(Debug, Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    /// Create a new job repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::with_source(ErrorKind::Database, format!("{context}: {e}"), e)
}

/// `UPDATE jobs SET <patched fields> WHERE id = $id`, open for more conditions.
fn update_query(id: &str, patch: &JobPatch) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::<Postgres>::new("UPDATE jobs SET ");
    {
        let mut set = query.separated(", ");
        set.push("updated_at = ")
            .push_bind_unseparated(patch.updated_at.unwrap_or_else(Utc::now));
        if let Some(state) = patch.state {
            set.push("state = ").push_bind_unseparated(state);
        }
        if let Some(attempts) = patch.attempts {
            set.push("attempts = ").push_bind_unseparated(attempts);
        }
        if let Some(next_run_at) = patch.next_run_at {
            set.push("next_run_at = ").push_bind_unseparated(next_run_at);
        }
        if let Some(processing_by) = patch.processing_by.clone() {
            set.push("processing_by = ")
                .push_bind_unseparated(processing_by);
        }
        if let Some(locked_at) = patch.locked_at {
            set.push("locked_at = ").push_bind_unseparated(locked_at);
        }
        if let Some(last_error) = patch.last_error.clone() {
            set.push("last_error = ").push_bind_unseparated(last_error);
        }
    }
    query.push(" WHERE id = ").push_bind(id.to_string());
    query
}

#[async_trait]
impl JobStore for JobRepository {
    async fn insert(&self, job: &Job) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO jobs (id, command, state, attempts, max_retries, created_at, updated_at, \
             next_run_at, processing_by, locked_at, last_error) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(&job.id)
        .bind(&job.command)
        .bind(job.state)
        .bind(job.attempts)
        .bind(job.max_retries)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.next_run_at)
        .bind(&job.processing_by)
        .bind(job.locked_at)
        .bind(&job.last_error)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error()
                .is_some_and(|db| db.is_unique_violation())
            {
                AppError::with_source(
                    ErrorKind::Conflict,
                    format!("Job '{}' already exists", job.id),
                    e,
                )
            } else {
                db_error("Failed to insert job")(e)
            }
        })?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Job> {
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to find job"))?
            .ok_or_else(|| AppError::not_found(format!("Job '{id}' not found")))
    }

    async fn list(&self, state: Option<JobState>) -> AppResult<Vec<Job>> {
        sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs WHERE ($1::job_state IS NULL OR state = $1) \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(state)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list jobs"))
    }

    async fn counts_by_state(&self) -> AppResult<JobCounts> {
        let rows: Vec<(JobState, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM jobs GROUP BY state")
                .fetch_all(&self.pool)
                .await
                .map_err(db_error("Failed to count jobs"))?;

        let mut counts = JobCounts::default();
        for (state, count) in rows {
            counts.add(state, count);
        }
        Ok(counts)
    }

    /// Claim the next due job (SKIP LOCKED for concurrency).
    async fn atomic_claim(&self, worker_id: &str, now: DateTime<Utc>) -> AppResult<Option<Job>> {
        sqlx::query_as::<_, Job>(
            "UPDATE jobs SET state = 'processing', processing_by = $1, locked_at = $2, \
             updated_at = $2 \
             WHERE id = ( \
                SELECT id FROM jobs \
                WHERE state IN ('pending', 'failed') \
                AND next_run_at <= $2 \
                ORDER BY created_at ASC, id ASC \
                LIMIT 1 \
                FOR UPDATE SKIP LOCKED \
             ) RETURNING *",
        )
        .bind(worker_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to claim job"))
    }

    async fn update(&self, id: &str, patch: &JobPatch) -> AppResult<Job> {
        let mut query = update_query(id, patch);
        query.push(" RETURNING *");

        query
            .build_query_as::<Job>()
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to update job"))?
            .ok_or_else(|| AppError::not_found(format!("Job '{id}' not found")))
    }

    async fn update_claimed(
        &self,
        id: &str,
        claim: &JobClaim,
        patch: &JobPatch,
    ) -> AppResult<Option<Job>> {
        let mut query = update_query(id, patch);
        query
            .push(" AND state = 'processing' AND processing_by = ")
            .push_bind(claim.worker_id.clone())
            .push(" AND locked_at = ")
            .push_bind(claim.locked_at)
            .push(" RETURNING *");

        let updated = query
            .build_query_as::<Job>()
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to record job outcome"))?;

        match updated {
            Some(job) => Ok(Some(job)),
            // Distinguish a lost claim from a missing job.
            None => self.find_by_id(id).await.map(|_| None),
        }
    }

    async fn find_stale_claims(&self, locked_before: DateTime<Utc>) -> AppResult<Vec<Job>> {
        sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs WHERE state = 'processing' AND locked_at < $1 \
             ORDER BY locked_at ASC",
        )
        .bind(locked_before)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to find stale claims"))
    }
}
