//! CLI command definitions and dispatch.

pub mod config;
pub mod dlq;
pub mod enqueue;
pub mod list;
pub mod migrate;
pub mod recover;
pub mod status;
pub mod worker;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;
use queuectl_core::config::AppConfig;
use queuectl_core::error::AppError;
use queuectl_database::connection::DatabasePool;
use queuectl_database::repositories::JobRepository;
use queuectl_worker::JobQueue;

/// queuectl — background job queue with retries and a dead-letter queue
#[derive(Debug, Parser)]
#[command(name = "queuectl", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config/default.toml")]
    pub config: String,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Enqueue a job from JSON
    Enqueue(enqueue::EnqueueArgs),
    /// Start or stop worker processes
    Worker(worker::WorkerArgs),
    /// Show job counts by state
    Status,
    /// List jobs
    List(list::ListArgs),
    /// Dead-letter queue management
    Dlq(dlq::DlqArgs),
    /// Fail jobs whose claim has been held too long
    Recover(recover::RecoverArgs),
    /// Configuration management
    Config(config::ConfigArgs),
    /// Apply database migrations
    Migrate,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        match &self.command {
            Commands::Enqueue(args) => enqueue::execute(args, &self.config, self.format).await,
            Commands::Worker(args) => worker::execute(args, &self.config).await,
            Commands::Status => status::execute(&self.config, self.format).await,
            Commands::List(args) => list::execute(args, &self.config, self.format).await,
            Commands::Dlq(args) => dlq::execute(args, &self.config, self.format).await,
            Commands::Recover(args) => recover::execute(args, &self.config, self.format).await,
            Commands::Config(args) => config::execute(args, &self.config, self.format).await,
            Commands::Migrate => migrate::execute(&self.config).await,
        }
    }
}

/// Helper: load configuration from file and environment
pub fn load_config(config_path: &str) -> Result<AppConfig, AppError> {
    let env = std::env::var("QUEUECTL_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(config_path, &env)
}

/// Helper: connect to the job store, apply migrations, and build the queue
pub async fn connect_queue(config: &AppConfig) -> Result<JobQueue, AppError> {
    let pool = DatabasePool::connect(&config.database).await?;
    queuectl_database::migration::run_migrations(pool.pool()).await?;

    let store = Arc::new(JobRepository::new(pool.into_pool()));
    Ok(JobQueue::from_config(store, &config.queue))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_worker_start() {
        let cli = Cli::parse_from(["queuectl", "worker", "start", "--count", "3"]);
        match cli.command {
            Commands::Worker(worker::WorkerArgs {
                command: worker::WorkerCommand::Start { count },
            }) => assert_eq!(count, 3),
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.config, "config/default.toml");
        assert_eq!(cli.format, OutputFormat::Table);
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["queuectl", "status", "--format", "json", "-c", "custom.toml"]);
        assert!(matches!(cli.command, Commands::Status));
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn test_parse_list_with_state() {
        let cli = Cli::parse_from(["queuectl", "list", "--state", "dead"]);
        match cli.command {
            Commands::List(args) => {
                assert_eq!(args.state, Some(queuectl_entity::job::JobState::Dead))
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_state() {
        assert!(Cli::try_parse_from(["queuectl", "list", "--state", "running"]).is_err());
    }

    #[test]
    fn test_parse_dlq_retry() {
        let cli = Cli::parse_from(["queuectl", "dlq", "retry", "job-42"]);
        match cli.command {
            Commands::Dlq(dlq::DlqArgs {
                command: dlq::DlqCommand::Retry { job_id },
            }) => assert_eq!(job_id, "job-42"),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
