//! queuectl worker process
//!
//! Runs a single worker loop: claim a due job, execute its command, record
//! the outcome, repeat. Spawned by `queuectl worker start`, one process per
//! worker. Stops between jobs on SIGINT or SIGTERM.

use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing;
use tracing_subscriber::{EnvFilter, fmt};

use queuectl_core::config::AppConfig;
use queuectl_core::error::AppError;
use queuectl_database::connection::DatabasePool;
use queuectl_database::repositories::JobRepository;
use queuectl_worker::{JobQueue, ShellExecutor, WorkerRunner};

/// queuectl worker process
#[derive(Debug, Parser)]
#[command(name = "queuectl-worker", version, about, long_about = None)]
struct Args {
    /// Identity recorded on claimed jobs
    #[arg(long)]
    id: String,

    /// Path to configuration file (falls back to $QUEUECTL_CONFIG)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match load_configuration(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config, args.id).await {
        tracing::error!("Worker error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from file and environment
fn load_configuration(config_path: Option<&str>) -> Result<AppConfig, AppError> {
    let config_path = config_path
        .map(str::to_string)
        .or_else(|| std::env::var("QUEUECTL_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    let env = std::env::var("QUEUECTL_ENV").unwrap_or_else(|_| "development".to_string());

    AppConfig::load(&config_path, &env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Connect to the store and run the worker loop until shutdown
async fn run(config: AppConfig, worker_id: String) -> Result<(), AppError> {
    tracing::info!(
        "Starting queuectl worker '{}' v{} (pid {})",
        worker_id,
        env!("CARGO_PKG_VERSION"),
        std::process::id()
    );

    tracing::info!("Connecting to database...");
    let db_pool = DatabasePool::connect(&config.database).await?;

    let store = Arc::new(JobRepository::new(db_pool.pool().clone()));
    let queue = Arc::new(JobQueue::from_config(store, &config.queue));
    let executor = Arc::new(ShellExecutor::from_config(&config.worker));
    let runner = WorkerRunner::from_config(queue, executor, worker_id, &config.worker);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, finishing current job...");
        let _ = shutdown_tx.send(true);
    });

    runner.run(shutdown_rx).await;

    db_pool.close().await;
    tracing::info!("Worker '{}' shut down gracefully", runner.worker_id());
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
