//! Table and JSON output formatting for CLI commands.

use serde::Serialize;
use tabled::{Table, Tabled};

use queuectl_entity::job::Job;

/// Output format selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// JSON output
    Json,
}

/// Job display row for table output
#[derive(Debug, Serialize, Tabled)]
pub struct JobRow {
    /// Job ID
    pub id: String,
    /// Lifecycle state
    pub state: String,
    /// Failed attempts so far, over the allowed total
    pub attempts: String,
    /// Shell command
    pub command: String,
    /// Earliest next run
    pub next_run_at: String,
    /// Worker holding the claim
    pub worker: String,
    /// Last recorded failure
    pub last_error: String,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            state: job.state.to_string(),
            attempts: format!("{}/{}", job.attempts, job.max_retries + 1),
            command: truncate(&job.command, 48),
            next_run_at: job
                .next_run_at
                .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string()),
            worker: job.processing_by.clone().unwrap_or_else(|| "-".to_string()),
            last_error: job
                .last_error
                .as_deref()
                .map(|e| truncate(e, 60))
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Print a list of items in the selected format
pub fn print_list<T: Serialize + Tabled>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("No results found.");
            } else {
                let table = Table::new(items).to_string();
                println!("{}", table);
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(items).unwrap_or_else(|_| "[]".to_string());
            println!("{}", json);
        }
    }
}

/// Print jobs: condensed rows as a table, full records as JSON
pub fn print_jobs(jobs: &[Job], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            let rows: Vec<JobRow> = jobs.iter().map(JobRow::from).collect();
            print_list(&rows, format);
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(jobs).unwrap_or_else(|_| "[]".to_string());
            println!("{}", json);
        }
    }
}

/// Print a single item in the selected format
pub fn print_item<T: Serialize + std::fmt::Debug>(item: &T, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            println!("{:#?}", item);
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(item).unwrap_or_else(|_| "{}".to_string());
            println!("{}", json);
        }
    }
}

/// Print a success message
pub fn print_success(msg: &str) {
    println!("✓ {}", msg);
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    println!("⚠ {}", msg);
}

/// Print an error message
pub fn print_error(msg: &str) {
    eprintln!("✗ {}", msg);
}

/// Print a key-value pair
pub fn print_kv(key: &str, value: &str) {
    println!("  {:<24} {}", format!("{}:", key), value);
}

fn truncate(text: &str, max_chars: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    match line.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &line[..idx]),
        None if line.len() < text.len() => format!("{line}…"),
        None => line.to_string(),
    }
}
