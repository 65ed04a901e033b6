//! PostgreSQL connection pool management.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use queuectl_core::config::DatabaseConfig;
use queuectl_core::error::{AppError, ErrorKind};

/// Wrapper around the sqlx PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// Connect to the job store. Callers treat failure here as fatal.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        info!(
            url = %mask_password(&config.url),
            max_connections = config.max_connections,
            "Connecting to job store"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Database,
                    format!("Failed to connect to job store: {e}"),
                    e,
                )
            })?;

        info!("Connected to job store");
        Ok(Self { pool })
    }

    /// Return a reference to the underlying sqlx pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Return the underlying sqlx pool (consuming self).
    pub fn into_pool(self) -> PgPool {
        self.pool
    }

    /// Close all connections in the pool.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Job store pool closed");
    }
}

/// Mask the password portion of a database URL for safe logging.
///
/// The credentials end at the last `@` of the authority, so passwords that
/// themselves contain `@` or `:` are hidden in full.
pub fn mask_password(url: &str) -> String {
    let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
    let authority_end = url[scheme_end..]
        .find('/')
        .map_or(url.len(), |p| scheme_end + p);
    let authority = &url[scheme_end..authority_end];

    let Some(at_pos) = authority.rfind('@') else {
        return url.to_string();
    };
    let Some(colon_pos) = authority[..at_pos].find(':') else {
        return url.to_string();
    };

    format!(
        "{}:****{}",
        &url[..scheme_end + colon_pos],
        &url[scheme_end + at_pos..]
    )
}
