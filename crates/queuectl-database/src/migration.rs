//! Database migration runner.

use sqlx::PgPool;
use tracing::info;

use queuectl_core::error::{AppError, ErrorKind};

/// Apply pending migrations to the job store.
pub async fn run_migrations(pool: &PgPool) -> Result<(), AppError> {
    info!("Running job store migrations...");

    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(|e| {
            AppError::with_source(
                ErrorKind::Database,
                format!("Failed to run migrations: {e}"),
                e,
            )
        })?;

    info!("Job store migrations completed");
    Ok(())
}
