//! Queue status command.

use std::path::Path;

use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use queuectl_core::error::AppError;
use queuectl_entity::job::{JobCounts, JobState};
use queuectl_worker::pool;

/// Count display row for table output
#[derive(Debug, Serialize, Tabled)]
struct CountRow {
    /// Lifecycle state
    state: String,
    /// Number of jobs
    jobs: i64,
}

/// Status report for JSON output
#[derive(Debug, Serialize)]
struct StatusReport {
    jobs: JobCounts,
    total: i64,
    workers: usize,
}

/// Execute the status command
pub async fn execute(config_path: &str, format: OutputFormat) -> Result<(), AppError> {
    let config = super::load_config(config_path)?;
    let queue = super::connect_queue(&config).await?;
    let counts = queue.status().await?;
    let workers = pool::read_pid_file(Path::new(&config.worker.pid_file))?;

    match format {
        OutputFormat::Table => {
            output::print_list(&count_rows(&counts), format);
            output::print_kv("Total", &counts.total().to_string());
            output::print_kv("Recorded workers", &workers.len().to_string());
        }
        OutputFormat::Json => output::print_item(
            &StatusReport {
                jobs: counts,
                total: counts.total(),
                workers: workers.len(),
            },
            format,
        ),
    }
    Ok(())
}

fn count_rows(counts: &JobCounts) -> Vec<CountRow> {
    JobState::ALL
        .into_iter()
        .map(|state| CountRow {
            state: state.to_string(),
            jobs: counts.get(state),
        })
        .collect()
}
