//! Worker supervision CLI commands.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use queuectl_core::error::AppError;
use queuectl_worker::WorkerPool;
use queuectl_worker::pool::{self, WorkerPid};

/// How often the supervisor checks for workers that exited on their own.
const REAP_INTERVAL: Duration = Duration::from_secs(1);

/// Arguments for worker commands
#[derive(Debug, Args)]
pub struct WorkerArgs {
    /// Worker subcommand
    #[command(subcommand)]
    pub command: WorkerCommand,
}

/// Worker subcommands
#[derive(Debug, Subcommand)]
pub enum WorkerCommand {
    /// Start worker processes and supervise them until Ctrl+C
    Start {
        /// Number of workers to start
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Signal the workers recorded by a running `worker start`
    Stop,
}

/// Worker display row for table output
#[derive(Debug, Serialize, Tabled)]
struct WorkerRow {
    /// Worker identity
    worker_id: String,
    /// OS process id
    pid: u32,
}

impl From<&WorkerPid> for WorkerRow {
    fn from(worker: &WorkerPid) -> Self {
        Self {
            worker_id: worker.worker_id.clone(),
            pid: worker.pid,
        }
    }
}

/// Execute worker commands
pub async fn execute(args: &WorkerArgs, config_path: &str) -> Result<(), AppError> {
    match &args.command {
        WorkerCommand::Start { count } => start(*count, config_path).await,
        WorkerCommand::Stop => stop(config_path),
    }
}

async fn start(count: usize, config_path: &str) -> Result<(), AppError> {
    if count == 0 {
        return Err(AppError::validation("--count must be at least 1"));
    }

    let config = super::load_config(config_path)?;
    // Fail before spawning anything if the store is unreachable.
    super::connect_queue(&config).await?;

    let pid_file = PathBuf::from(&config.worker.pid_file);
    let program = pool::resolve_worker_executable(&config.worker);
    tracing::debug!(program = %program.display(), count, "Starting workers");

    let mut workers =
        WorkerPool::new(program).with_args(vec!["--config".to_string(), config_path.to_string()]);
    let started = match workers.start_workers(count) {
        Ok(started) => started,
        Err(e) => {
            workers.stop_workers();
            return Err(e);
        }
    };
    if let Err(e) = pool::write_pid_file(&pid_file, &started) {
        workers.stop_workers();
        return Err(e);
    }

    let rows: Vec<WorkerRow> = started.iter().map(WorkerRow::from).collect();
    output::print_list(&rows, OutputFormat::Table);
    output::print_success(&format!(
        "Started {} workers. Press Ctrl+C to stop.",
        started.len()
    ));

    supervise(&mut workers, &pid_file).await;

    let signalled = workers.stop_workers();
    pool::remove_pid_file(&pid_file)?;
    output::print_success(&format!(
        "Sent stop signal to {} workers. Running jobs will finish first.",
        signalled
    ));
    Ok(())
}

/// Wait for a shutdown signal, or for every worker to exit on its own.
async fn supervise(workers: &mut WorkerPool, pid_file: &Path) {
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(REAP_INTERVAL);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received, stopping workers...");
                return;
            }
            _ = ticker.tick() => {
                if workers.reap().is_empty() {
                    continue;
                }
                if workers.is_empty() {
                    output::print_warning("All workers have exited.");
                    return;
                }
                if let Err(e) = pool::write_pid_file(pid_file, &workers.pids()) {
                    tracing::warn!("Failed to update pid file: {}", e);
                }
            }
        }
    }
}

fn stop(config_path: &str) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let pid_file = Path::new(&config.worker.pid_file);

    let recorded = pool::read_pid_file(pid_file)?;
    if recorded.is_empty() {
        output::print_warning(&format!(
            "No running workers recorded in '{}'",
            pid_file.display()
        ));
        return Ok(());
    }

    let mut signalled = 0;
    for worker in &recorded {
        if pool::signal_worker(worker.pid)? {
            signalled += 1;
        } else {
            tracing::info!("Worker '{}' (pid {}) was not running", worker.worker_id, worker.pid);
        }
    }
    pool::remove_pid_file(pid_file)?;

    output::print_success(&format!(
        "Sent stop signal to {} of {} recorded workers.",
        signalled,
        recorded.len()
    ));
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
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
