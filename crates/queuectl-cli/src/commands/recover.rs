//! Orphaned claim recovery command.

use std::time::Duration;

use clap::Args;

use crate::output::{self, OutputFormat};
use queuectl_core::error::AppError;

/// Arguments for the recover command
#[derive(Debug, Args)]
pub struct RecoverArgs {
    /// Fail `processing` jobs whose claim is older than this many seconds
    #[arg(long, value_name = "SECS")]
    pub older_than: u64,
}

/// Execute the recover command
pub async fn execute(
    args: &RecoverArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let queue = super::connect_queue(&config).await?;

    let recovered = queue
        .recover_stale(Duration::from_secs(args.older_than))
        .await?;

    match format {
        OutputFormat::Table if recovered.is_empty() => {
            println!("No claims older than {}s.", args.older_than)
        }
        OutputFormat::Table => {
            output::print_jobs(&recovered, format);
            output::print_success(&format!("Recovered {} stale claims", recovered.len()));
        }
        OutputFormat::Json => output::print_jobs(&recovered, format),
    }
    Ok(())
}
