//! Job listing command.

use clap::Args;

use crate::output::{self, OutputFormat};
use queuectl_core::error::AppError;
use queuectl_entity::job::JobState;

/// Arguments for the list command
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Only show jobs in this state (pending, processing, completed, failed, dead)
    #[arg(short, long)]
    pub state: Option<JobState>,
}

/// Execute the list command
pub async fn execute(args: &ListArgs, config_path: &str, format: OutputFormat) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let queue = super::connect_queue(&config).await?;

    let jobs = queue.list(args.state).await?;
    output::print_jobs(&jobs, format);
    Ok(())
}
