//! Job submission command.

use std::path::PathBuf;

use clap::Args;

use crate::output::{self, OutputFormat};
use queuectl_core::error::AppError;
use queuectl_entity::job::EnqueueRequest;

/// Arguments for the enqueue command
#[derive(Debug, Args)]
pub struct EnqueueArgs {
    /// Job JSON, e.g. '{"id":"job1","command":"sleep 2","max_retries":3}'
    pub job_json: Option<String>,

    /// Read the job JSON from a file instead
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,
}

/// Execute the enqueue command
pub async fn execute(
    args: &EnqueueArgs,
    config_path: &str,
    format: OutputFormat,
) -> Result<(), AppError> {
    let payload = match &args.file {
        Some(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::validation(format!("Failed to read '{}': {}", path.display(), e))
        })?,
        None => args.job_json.clone().ok_or_else(|| {
            AppError::validation("No job JSON provided. Pass it as an argument or use --file")
        })?,
    };
    let request = parse_request(&payload)?;

    let config = super::load_config(config_path)?;
    let queue = super::connect_queue(&config).await?;
    let job = queue.enqueue(request).await?;

    match format {
        OutputFormat::Table => output::print_success(&format!("Enqueued job {}", job.id)),
        OutputFormat::Json => output::print_item(&job, format),
    }
    Ok(())
}

/// Parse an enqueue payload.
fn parse_request(payload: &str) -> Result<EnqueueRequest, AppError> {
    serde_json::from_str(payload)
        .map_err(|e| AppError::validation(format!("Invalid job JSON: {}", e)))
}
