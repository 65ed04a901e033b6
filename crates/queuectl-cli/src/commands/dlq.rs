//! Dead-letter queue commands.

use clap::{Args, Subcommand};

use crate::output::{self, OutputFormat};
use queuectl_core::error::AppError;
use queuectl_entity::job::JobState;

/// Arguments for dlq commands
#[derive(Debug, Args)]
pub struct DlqArgs {
    /// DLQ subcommand
    #[command(subcommand)]
    pub command: DlqCommand,
}

/// DLQ subcommands
#[derive(Debug, Subcommand)]
pub enum DlqCommand {
    /// List dead jobs
    List,
    /// Requeue a dead job with a fresh retry budget
    Retry {
        /// Job ID
        job_id: String,
    },
}

/// Execute dlq commands
pub async fn execute(args: &DlqArgs, config_path: &str, format: OutputFormat) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let queue = super::connect_queue(&config).await?;

    match &args.command {
        DlqCommand::List => {
            let jobs = queue.list(Some(JobState::Dead)).await?;
            output::print_jobs(&jobs, format);
        }
        DlqCommand::Retry { job_id } => {
            let job = queue.retry_dead_job(job_id).await?;
            match format {
                OutputFormat::Table => {
                    output::print_success(&format!("Queued DLQ job {} for retry", job.id))
                }
                OutputFormat::Json => output::print_item(&job, format),
            }
        }
    }

    Ok(())
}
