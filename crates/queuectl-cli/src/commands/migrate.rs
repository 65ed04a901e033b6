//! Database migration command.

use crate::output;
use queuectl_core::error::AppError;
use queuectl_database::connection::DatabasePool;

/// Apply all pending migrations
pub async fn execute(config_path: &str) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let pool = DatabasePool::connect(&config.database).await?;

    println!("Running database migrations...");
    queuectl_database::migration::run_migrations(pool.pool()).await?;
    pool.close().await;

    output::print_success("All migrations applied successfully.");
    Ok(())
}
